use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::{LiveQueue, PlaybackError, PlaybackItem, PlaybackProvider};

const TOKEN_ENDPOINT: &str = "https://accounts.spotify.com/api/token";
const QUEUE_ENDPOINT: &str = "https://api.spotify.com/v1/me/player/queue";

/// Credentials of the registered Spotify application
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    currently_playing: Option<QueueItem>,
    #[serde(default)]
    queue: Vec<QueueItem>,
}

#[derive(Debug, Deserialize)]
struct QueueItem {
    uri: String,
}

impl From<QueueResponse> for LiveQueue {
    fn from(response: QueueResponse) -> Self {
        LiveQueue {
            currently_playing: response.currently_playing.map(|item| PlaybackItem::new(item.uri)),
            queued: response
                .queue
                .into_iter()
                .map(|item| PlaybackItem::new(item.uri))
                .collect(),
        }
    }
}

/// Spotify Web API implementation of the playback provider
pub struct SpotifyPlaybackProvider {
    client: Client,
    config: SpotifyConfig,
}

impl SpotifyPlaybackProvider {
    pub fn new(config: SpotifyConfig) -> Result<Self, PlaybackError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self { client, config })
    }

    async fn api_error(response: reqwest::Response) -> PlaybackError {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return PlaybackError::NoActiveDevice;
        }
        let message = response.text().await.unwrap_or_default();
        PlaybackError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl PlaybackProvider for SpotifyPlaybackProvider {
    #[instrument(skip_all)]
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, PlaybackError> {
        let response = self
            .client
            .post(TOKEN_ENDPOINT)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "Spotify refused token refresh");
            return Err(PlaybackError::TokenRefresh(body));
        }

        let token: TokenResponse = response.json().await?;
        debug!("Spotify access token refreshed");
        Ok(token.access_token)
    }

    #[instrument(skip_all)]
    async fn get_live_queue(&self, access_token: &str) -> Result<LiveQueue, PlaybackError> {
        let response = self
            .client
            .get(QUEUE_ENDPOINT)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let queue: QueueResponse = response.json().await?;
        Ok(queue.into())
    }

    #[instrument(skip(self, access_token))]
    async fn enqueue(&self, access_token: &str, uri: &str) -> Result<(), PlaybackError> {
        let response = self
            .client
            .post(QUEUE_ENDPOINT)
            .bearer_auth(access_token)
            .query(&[("uri", uri)])
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        debug!(uri, "Song added to Spotify queue");
        Ok(())
    }
}
