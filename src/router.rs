use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::shared::AppState;
use crate::{song, track, vote, websockets};

/// Every HTTP route of the server
pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "OK" }))
        .route("/tracks", post(track::create_track))
        .route("/tracks/:track_id", delete(track::close_track))
        .route("/tracks/:track_id/djs", post(track::join_track))
        .route(
            "/tracks/:track_id/djs/:dj_id",
            patch(track::update_dj).delete(track::leave_track),
        )
        .route(
            "/tracks/:track_id/djs/:dj_id/songs",
            get(song::list_dj_songs),
        )
        .route("/tracks/:track_id/leaderboard", get(track::leaderboard))
        .route("/tracks/:track_id/songs", post(song::add_song))
        .route(
            "/tracks/:track_id/votes",
            post(vote::cast_vote).get(vote::current_tally),
        )
        .route("/tracks/:track_id/ws", get(websockets::track_events_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
