use std::sync::Arc;

use tracing::{info, instrument, warn};

use super::types::{AddSongRequest, SongHistoryEntry};
use crate::event::{EventBus, TrackEvent};
use crate::scoring::VoteTally;
use crate::playback::PlaybackProvider;
use crate::shared::AppError;
use crate::track::models::{NewSong, SongModel};
use crate::track::repository::TrackRepository;

/// Service for putting songs on the track owner's player
pub struct QueueService {
    repository: Arc<dyn TrackRepository>,
    provider: Arc<dyn PlaybackProvider>,
    event_bus: EventBus,
}

impl QueueService {
    pub fn new(
        repository: Arc<dyn TrackRepository>,
        provider: Arc<dyn PlaybackProvider>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            repository,
            provider,
            event_bus,
        }
    }

    /// Enqueues the song on the provider, then records it as unscored
    ///
    /// Nothing is recorded if the provider refuses the song.
    #[instrument(skip(self, request), fields(dj_id = request.dj_id, uri = %request.uri))]
    pub async fn add_song(
        &self,
        track_id: i64,
        request: AddSongRequest,
    ) -> Result<SongModel, AppError> {
        let uri = request.uri.trim();
        if uri.is_empty() {
            return Err(AppError::BadRequest("Song URI must not be empty".to_string()));
        }

        let track = self
            .repository
            .get_track(track_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Track not found".to_string()))?;

        match self.repository.get_dj(request.dj_id).await? {
            Some(dj) if dj.track_id == track_id => {}
            _ => return Err(AppError::NotFound("DJ not found in track".to_string())),
        }

        let access_token = self
            .provider
            .refresh_access_token(&track.refresh_token)
            .await
            .map_err(|e| {
                warn!(track_id, error = %e, "Token refresh failed while adding song");
                AppError::from(e)
            })?;
        self.provider.enqueue(&access_token, uri).await?;

        let song = self
            .repository
            .create_song(&NewSong {
                track_id,
                dj_id: request.dj_id,
                uri: uri.to_string(),
                name: request.name,
                artist: request.artist,
                cover: request.cover,
            })
            .await?;

        info!(track_id, song_id = song.id, "Song added to queue");
        self.event_bus
            .emit_to_track(track_id, TrackEvent::SongAdded { song: song.clone() })
            .await;
        Ok(song)
    }

    /// Songs the DJ added to the track, with the votes each one received
    ///
    /// History outlives the DJ: songs of a DJ who left are still listed.
    #[instrument(skip(self))]
    pub async fn songs_by_dj(
        &self,
        track_id: i64,
        dj_id: i64,
    ) -> Result<Vec<SongHistoryEntry>, AppError> {
        self.repository
            .get_track(track_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Track not found".to_string()))?;

        let in_track = matches!(
            self.repository.get_dj(dj_id).await?,
            Some(dj) if dj.track_id == track_id
        );
        let songs: Vec<_> = self
            .repository
            .find_songs_by_dj(dj_id)
            .await?
            .into_iter()
            .filter(|entry| entry.song.track_id == track_id)
            .collect();
        if !in_track && songs.is_empty() {
            return Err(AppError::NotFound("DJ not found in track".to_string()));
        }

        Ok(songs
            .into_iter()
            .map(|entry| SongHistoryEntry {
                tally: VoteTally::from_votes(&entry.votes),
                song: entry.song,
            })
            .collect())
    }
}
