use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::instrument;

use super::{
    service::VoteService,
    types::{CastVoteRequest, TallyResponse},
};
use crate::scoring::{MajoritySet, VoteTally};
use crate::shared::{AppError, AppState};
use crate::track::models::VoteModel;

fn vote_service(state: &AppState) -> VoteService {
    VoteService::new(Arc::clone(&state.track_repository), state.event_bus.clone())
}

/// HTTP handler for voting on the song that is playing
///
/// POST /tracks/:track_id/votes
#[instrument(name = "cast_vote", skip(state))]
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
    Json(request): Json<CastVoteRequest>,
) -> Result<(StatusCode, Json<VoteModel>), AppError> {
    let vote = vote_service(&state)
        .cast_vote(track_id, request.dj_id, request.category)
        .await?;
    Ok((StatusCode::CREATED, Json(vote)))
}

/// GET /tracks/:track_id/votes
#[instrument(name = "current_tally", skip(state))]
pub async fn current_tally(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> Result<Json<TallyResponse>, AppError> {
    let response = match vote_service(&state).current_tally(track_id).await? {
        Some(judged) => TallyResponse {
            song: Some(judged.song),
            tally: judged.tally,
            majority: judged.tally.majority(),
        },
        None => TallyResponse {
            song: None,
            tally: VoteTally::default(),
            majority: MajoritySet::empty(),
        },
    };
    Ok(Json(response))
}
