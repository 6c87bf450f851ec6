use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    service::QueueService,
    types::{AddSongRequest, DjSongsResponse},
};
use crate::shared::{AppError, AppState};
use crate::track::models::SongModel;

/// HTTP handler for adding a song to the track owner's queue
///
/// POST /tracks/:track_id/songs
#[instrument(name = "add_song", skip(state, request))]
pub async fn add_song(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
    Json(request): Json<AddSongRequest>,
) -> Result<(StatusCode, Json<SongModel>), AppError> {
    let service = QueueService::new(
        Arc::clone(&state.track_repository),
        Arc::clone(&state.playback_provider),
        state.event_bus.clone(),
    );
    let song = service.add_song(track_id, request).await?;
    Ok((StatusCode::CREATED, Json(song)))
}

/// GET /tracks/:track_id/djs/:dj_id/songs
#[instrument(name = "list_dj_songs", skip(state))]
pub async fn list_dj_songs(
    State(state): State<AppState>,
    Path((track_id, dj_id)): Path<(i64, i64)>,
) -> Result<Json<DjSongsResponse>, AppError> {
    let service = QueueService::new(
        Arc::clone(&state.track_repository),
        Arc::clone(&state.playback_provider),
        state.event_bus.clone(),
    );
    let songs = service.songs_by_dj(track_id, dj_id).await?;
    Ok(Json(DjSongsResponse { dj_id, songs }))
}
