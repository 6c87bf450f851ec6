use std::str::FromStr;
use std::time::Duration;

use crate::playback::SpotifyConfig;
use crate::track::CleanupConfig;
use crate::watcher::WatcherConfig;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Process configuration, read from environment variables
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    /// Postgres connection string; the in-memory store is used when unset
    pub database_url: Option<String>,
    pub spotify: SpotifyConfig,
    pub watcher: WatcherConfig,
    pub cleanup: CleanupConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let watcher_defaults = WatcherConfig::default();
        let cleanup_defaults = CleanupConfig::default();

        let secs = |key: &str, default: Duration| {
            positive(&lookup, key)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            bind_address: lookup("BIND_ADDRESS")
                .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string()),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            spotify: SpotifyConfig {
                client_id: lookup("SPOTIFY_CLIENT_ID").unwrap_or_default(),
                client_secret: lookup("SPOTIFY_CLIENT_SECRET").unwrap_or_default(),
                request_timeout: secs("PROVIDER_TIMEOUT_SECS", Duration::from_secs(10)),
            },
            watcher: WatcherConfig {
                poll_interval: secs("WATCHER_INTERVAL_SECS", watcher_defaults.poll_interval),
                max_scoring_attempts: parsed(&lookup, "MAX_SCORING_ATTEMPTS")
                    .unwrap_or(watcher_defaults.max_scoring_attempts),
            },
            cleanup: CleanupConfig {
                cleanup_interval: secs("CLEANUP_INTERVAL_SECS", cleanup_defaults.cleanup_interval),
                retention: positive(&lookup, "TRACK_RETENTION_HOURS")
                    .and_then(|hours| hours.checked_mul(60 * 60))
                    .map(Duration::from_secs)
                    .unwrap_or(cleanup_defaults.retention),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

/// Parses a variable, ignoring values that do not parse
fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}

/// Parses a count or period; zero is treated like a missing value
fn positive(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u64> {
    parsed(lookup, key).filter(|value| *value > 0)
}
