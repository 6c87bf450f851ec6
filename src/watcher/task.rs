use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, instrument};

use super::PlaybackWatcher;

/// Configuration for the playback watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// How often every track's player is polled
    pub poll_interval: Duration,
    /// Failed scoring runs before a song is given up on
    pub max_scoring_attempts: u32,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_scoring_attempts: 3,
        }
    }
}

/// Runs the watcher forever, one tick per interval
///
/// Each tick runs on its own task so a slow tick never delays the timer; the
/// watcher's in-flight flag turns the overlapping tick into a no-op.
#[instrument(skip(watcher))]
pub async fn start_playback_watcher(watcher: Arc<PlaybackWatcher>, poll_interval: Duration) {
    info!(
        poll_interval_secs = poll_interval.as_secs(),
        "Starting playback watcher background task"
    );

    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let watcher = Arc::clone(&watcher);
        tokio::spawn(async move {
            watcher.tick().await;
        });
    }
}
