use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::event::EventBus;
use crate::playback::{PlaybackError, PlaybackProvider};
use crate::track::repository::TrackRepository;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub track_repository: Arc<dyn TrackRepository>,
    pub playback_provider: Arc<dyn PlaybackProvider>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(
        track_repository: Arc<dyn TrackRepository>,
        playback_provider: Arc<dyn PlaybackProvider>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            track_repository,
            playback_provider,
            event_bus,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Playback provider error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Internal server error")]
    Internal,
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::DatabaseError(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::DatabaseError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", msg),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Playback(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            AppError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}
