use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, instrument, warn};

use super::repository::TrackRepository;
use crate::event::{EventBus, TrackEvent};
use crate::shared::AppError;

/// Configuration for the cleanup task
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// How often to run the cleanup task
    pub cleanup_interval: Duration,
    /// How long a track must be idle before deletion
    pub retention: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(15 * 60), // 15 minutes
            retention: Duration::from_secs(6 * 60 * 60),    // 6 hours
        }
    }
}

/// Starts the background cleanup task that periodically removes idle tracks
#[instrument(skip(track_repository, event_bus))]
pub async fn start_cleanup_task(
    track_repository: Arc<dyn TrackRepository>,
    event_bus: EventBus,
    config: CleanupConfig,
) {
    info!(
        cleanup_interval_secs = config.cleanup_interval.as_secs(),
        retention_secs = config.retention.as_secs(),
        "Starting track cleanup background task"
    );

    let mut cleanup_interval = interval(config.cleanup_interval);

    loop {
        cleanup_interval.tick().await;

        match cleanup_idle_tracks(&track_repository, &event_bus, config.retention).await {
            Ok(deleted_count) => {
                info!(deleted_count, "Track cleanup completed");
            }
            Err(e) => {
                error!(error = %e, "Track cleanup task failed");
            }
        }
    }
}

/// Deletes tracks that have not changed for longer than the retention window
#[instrument(skip(track_repository, event_bus))]
pub async fn cleanup_idle_tracks(
    track_repository: &Arc<dyn TrackRepository>,
    event_bus: &EventBus,
    retention: Duration,
) -> Result<usize, AppError> {
    let retention = chrono::Duration::from_std(retention)
        .map_err(|e| AppError::BadRequest(format!("Invalid retention window: {}", e)))?;
    let cutoff = Utc::now() - retention;

    let idle_track_ids = track_repository.find_idle_tracks(cutoff).await?;
    if idle_track_ids.is_empty() {
        return Ok(0);
    }

    info!(count = idle_track_ids.len(), "Found idle tracks to delete");

    let mut deleted_count = 0;
    for track_id in idle_track_ids {
        match track_repository.delete_track(track_id).await {
            Ok(()) => {
                deleted_count += 1;
                event_bus
                    .emit_to_track(track_id, TrackEvent::TrackClosed { track_id })
                    .await;
                event_bus.close_track(track_id).await;
                info!(track_id, "Deleted idle track");
            }
            Err(e) => {
                warn!(track_id, error = %e, "Failed to delete idle track");
            }
        }
    }

    Ok(deleted_count)
}
