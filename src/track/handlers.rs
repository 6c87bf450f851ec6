use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    models::DjModel,
    service::TrackService,
    types::{
        CreateTrackRequest, JoinTrackRequest, LeaderboardResponse, TrackResponse, UpdateDjRequest,
    },
};
use crate::shared::{AppError, AppState};

fn track_service(state: &AppState) -> TrackService {
    TrackService::new(Arc::clone(&state.track_repository), state.event_bus.clone())
}

/// HTTP handler for opening a new track
///
/// POST /tracks
#[instrument(name = "create_track", skip(state, request))]
pub async fn create_track(
    State(state): State<AppState>,
    Json(request): Json<CreateTrackRequest>,
) -> Result<(StatusCode, Json<TrackResponse>), AppError> {
    let track = track_service(&state).create_track(request).await?;
    info!(track_id = track.id, "Track opened");
    Ok((StatusCode::CREATED, Json(track.into())))
}

/// DELETE /tracks/:track_id
#[instrument(name = "close_track", skip(state))]
pub async fn close_track(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    track_service(&state).close_track(track_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// HTTP handler for joining a track as a DJ
///
/// POST /tracks/:track_id/djs
#[instrument(name = "join_track", skip(state, request))]
pub async fn join_track(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
    Json(request): Json<JoinTrackRequest>,
) -> Result<(StatusCode, Json<DjModel>), AppError> {
    let dj = track_service(&state).join_track(track_id, request).await?;
    Ok((StatusCode::CREATED, Json(dj)))
}

/// PATCH /tracks/:track_id/djs/:dj_id
#[instrument(name = "update_dj", skip(state, request))]
pub async fn update_dj(
    State(state): State<AppState>,
    Path((track_id, dj_id)): Path<(i64, i64)>,
    Json(request): Json<UpdateDjRequest>,
) -> Result<Json<DjModel>, AppError> {
    let dj = track_service(&state)
        .update_dj_profile(track_id, dj_id, request)
        .await?;
    Ok(Json(dj))
}

/// DELETE /tracks/:track_id/djs/:dj_id
#[instrument(name = "leave_track", skip(state))]
pub async fn leave_track(
    State(state): State<AppState>,
    Path((track_id, dj_id)): Path<(i64, i64)>,
) -> Result<StatusCode, AppError> {
    track_service(&state).leave_track(track_id, dj_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /tracks/:track_id/leaderboard
#[instrument(name = "leaderboard", skip(state))]
pub async fn leaderboard(
    State(state): State<AppState>,
    Path(track_id): Path<i64>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    let djs = track_service(&state).leaderboard(track_id).await?;
    Ok(Json(LeaderboardResponse { track_id, djs }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::test_utils::AppStateBuilder;
    use crate::track::repository::InMemoryTrackRepository;
    use axum::{
        body::Body,
        http::Request,
        routing::{delete, get, patch, post},
        Router,
    };
    use tower::ServiceExt; // for `oneshot`

    fn app(state: AppState) -> Router {
        Router::new()
            .route("/tracks", post(create_track))
            .route("/tracks/:track_id", delete(close_track))
            .route("/tracks/:track_id/djs", post(join_track))
            .route(
                "/tracks/:track_id/djs/:dj_id",
                patch(update_dj).delete(leave_track),
            )
            .route("/tracks/:track_id/leaderboard", get(leaderboard))
            .with_state(state)
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_create_track_handler() {
        let app = app(AppStateBuilder::new().build());

        let response = app
            .oneshot(json_request(
                "POST",
                "/tracks",
                r#"{"name": "Friday", "refresh_token": "secret"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(!text.contains("secret"));
        let track: TrackResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(track.name, "Friday");
        assert!((100_000..=999_999).contains(&track.id));
    }

    #[tokio::test]
    async fn test_create_track_handler_invalid_json() {
        let app = app(AppStateBuilder::new().build());

        let response = app
            .oneshot(json_request("POST", "/tracks", r#"{"name": "Friday""#))
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_join_and_leaderboard_handlers() {
        let repo = Arc::new(InMemoryTrackRepository::new());
        let state = AppStateBuilder::new()
            .with_track_repository(repo.clone())
            .build();
        let track = track_service(&state)
            .create_track(CreateTrackRequest {
                name: "Party".to_string(),
                refresh_token: "refresh".to_string(),
            })
            .await
            .unwrap();

        let response = app(state.clone())
            .oneshot(json_request(
                "POST",
                &format!("/tracks/{}/djs", track.id),
                r#"{"name": "sam", "avatar": "fox"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let dj: DjModel = body_json(response).await;
        assert_eq!(dj.name, "sam");

        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .uri(format!("/tracks/{}/leaderboard", track.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let board: LeaderboardResponse = body_json(response).await;
        assert_eq!(board.djs, vec![dj]);
    }

    #[tokio::test]
    async fn test_duplicate_dj_name_is_conflict() {
        let state = AppStateBuilder::new().build();
        let track = track_service(&state)
            .create_track(CreateTrackRequest {
                name: "Party".to_string(),
                refresh_token: "refresh".to_string(),
            })
            .await
            .unwrap();
        let uri = format!("/tracks/{}/djs", track.id);

        let first = app(state.clone())
            .oneshot(json_request("POST", &uri, r#"{"name": "sam"}"#))
            .await
            .unwrap();
        let second = app(state.clone())
            .oneshot(json_request("POST", &uri, r#"{"name": "sam"}"#))
            .await
            .unwrap();

        assert_eq!(first.status(), StatusCode::CREATED);
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let error: serde_json::Value = body_json(second).await;
        assert!(error["error"].as_str().unwrap().contains("sam"));
    }

    #[tokio::test]
    async fn test_unknown_track_is_not_found() {
        let response = app(AppStateBuilder::new().build())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/tracks/123456")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_and_leave_handlers() {
        let state = AppStateBuilder::new().build();
        let service = track_service(&state);
        let track = service
            .create_track(CreateTrackRequest {
                name: "Party".to_string(),
                refresh_token: "refresh".to_string(),
            })
            .await
            .unwrap();
        let dj = service
            .join_track(track.id, JoinTrackRequest::default())
            .await
            .unwrap();
        let uri = format!("/tracks/{}/djs/{}", track.id, dj.id);

        let response = app(state.clone())
            .oneshot(json_request("PATCH", &uri, r#"{"name": "renamed"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated: DjModel = body_json(response).await;
        assert_eq!(updated.name, "renamed");

        let response = app(state.clone())
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(uri.as_str())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }
}
