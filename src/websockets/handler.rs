use axum::{
    extract::{Path, State, WebSocketUpgrade},
    response::Response,
};
use tracing::{info, warn};

use crate::shared::{AppError, AppState};

use super::socket::Connection;

/// Live event feed for one track
///
/// GET /tracks/:track_id/ws
pub async fn track_events_handler(
    ws: WebSocketUpgrade,
    Path(track_id): Path<i64>,
    State(app_state): State<AppState>,
) -> Result<Response, AppError> {
    if app_state.track_repository.get_track(track_id).await?.is_none() {
        warn!(track_id, "Track not found, rejecting WebSocket connection");
        return Err(AppError::NotFound("Track not found".to_string()));
    }

    info!(track_id, "WebSocket subscription requested");
    Ok(ws.on_upgrade(move |socket| handle_websocket_connection(socket, track_id, app_state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_websocket_connection(
    socket: axum::extract::ws::WebSocket,
    track_id: i64,
    app_state: AppState,
) {
    let events = app_state.event_bus.subscribe_to_track(track_id).await;
    let connection = Connection::new(track_id, Box::new(socket), events);

    match connection.run().await {
        Ok(()) => {
            info!(track_id, "WebSocket connection closed cleanly");
        }
        Err(e) => {
            warn!(track_id, error = %e, "WebSocket connection error");
        }
    }
}
