use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod spotify;

pub use spotify::{SpotifyConfig, SpotifyPlaybackProvider};

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Token refresh rejected: {0}")]
    TokenRefresh(String),

    #[error("Provider responded with {status}: {message}")]
    Api { status: u16, message: String },

    #[error("No active playback device")]
    NoActiveDevice,
}

/// One item known to the provider's player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackItem {
    pub uri: String,
}

impl PlaybackItem {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

/// Snapshot of what the provider is playing and what is waiting after it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveQueue {
    pub currently_playing: Option<PlaybackItem>,
    pub queued: Vec<PlaybackItem>,
}

impl LiveQueue {
    pub fn is_queued(&self, uri: &str) -> bool {
        self.queued.iter().any(|item| item.uri == uri)
    }

    pub fn is_playing(&self, uri: &str) -> bool {
        self.currently_playing
            .as_ref()
            .is_some_and(|item| item.uri == uri)
    }

    /// A song played through once the player has moved on to something else
    /// and the song is no longer waiting in the queue either
    pub fn has_finished(&self, uri: &str) -> bool {
        self.currently_playing.is_some() && !self.is_playing(uri) && !self.is_queued(uri)
    }
}

/// Playback service a track is bound to
#[async_trait]
pub trait PlaybackProvider: Send + Sync {
    /// Exchanges the track owner's refresh token for a short-lived access token
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, PlaybackError>;

    async fn get_live_queue(&self, access_token: &str) -> Result<LiveQueue, PlaybackError>;

    /// Appends a song URI to the player's queue
    async fn enqueue(&self, access_token: &str, uri: &str) -> Result<(), PlaybackError>;
}
