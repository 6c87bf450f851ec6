use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trackdj::{
    build_router,
    playback::{PlaybackProvider, SpotifyPlaybackProvider},
    track::{
        repository::{InMemoryTrackRepository, PostgresTrackRepository},
        start_cleanup_task,
    },
    watcher::start_playback_watcher,
    AppConfig, AppState, EventBus, PlaybackWatcher, ScoringService, TrackRepository,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trackdj=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting track scoring server");

    let config = AppConfig::from_env();

    let track_repository: Arc<dyn TrackRepository> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            let repository = PostgresTrackRepository::new(pool);
            repository.migrate().await?;
            info!("Using PostgreSQL track repository");
            Arc::new(repository)
        }
        None => {
            warn!("DATABASE_URL not set, tracks are kept in memory only");
            Arc::new(InMemoryTrackRepository::new())
        }
    };

    if config.spotify.client_id.is_empty() {
        warn!("SPOTIFY_CLIENT_ID not set, token refresh will be rejected");
    }
    let playback_provider: Arc<dyn PlaybackProvider> =
        Arc::new(SpotifyPlaybackProvider::new(config.spotify.clone())?);

    let event_bus = EventBus::new();
    let scoring = Arc::new(ScoringService::builder(track_repository.clone(), event_bus.clone()).build());

    let watcher = Arc::new(PlaybackWatcher::new(
        track_repository.clone(),
        playback_provider.clone(),
        scoring,
        config.watcher.max_scoring_attempts,
    ));
    let watcher_task = tokio::spawn(start_playback_watcher(
        watcher,
        config.watcher.poll_interval,
    ));
    let cleanup_task = tokio::spawn(start_cleanup_task(
        track_repository.clone(),
        event_bus.clone(),
        config.cleanup.clone(),
    ));

    let app_state = AppState::new(track_repository, playback_provider, event_bus);
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "Server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down background tasks");
    watcher_task.abort();
    cleanup_task.abort();
    for task in [watcher_task, cleanup_task] {
        if let Err(e) = task.await {
            if !e.is_cancelled() {
                error!(error = %e, "Background task ended abnormally");
            }
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
