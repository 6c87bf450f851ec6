use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::event::{EventBus, TrackEvent};
use crate::scoring::VoteTally;
use crate::shared::AppError;
use crate::track::models::{NewVote, SongModel, VoteCategory, VoteModel};
use crate::track::repository::TrackRepository;

#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Track {0} not found")]
    TrackNotFound(i64),

    #[error("DJ {dj_id} is not part of track {track_id}")]
    NotInTrack { track_id: i64, dj_id: i64 },

    #[error("No song is waiting to be judged")]
    NoSongPlaying,

    #[error("DJ {dj_id} already voted on song {song_id}")]
    AlreadyVoted { dj_id: i64, song_id: i64 },

    #[error(transparent)]
    Repository(AppError),
}

impl From<AppError> for VoteError {
    fn from(e: AppError) -> Self {
        VoteError::Repository(e)
    }
}

impl From<VoteError> for AppError {
    fn from(e: VoteError) -> Self {
        match e {
            VoteError::TrackNotFound(_) | VoteError::NotInTrack { .. } => {
                AppError::NotFound(e.to_string())
            }
            VoteError::NoSongPlaying => AppError::BadRequest(e.to_string()),
            VoteError::AlreadyVoted { .. } => AppError::Conflict(e.to_string()),
            VoteError::Repository(inner) => inner,
        }
    }
}

/// The song currently being judged and the votes it has so far
#[derive(Debug, Clone)]
pub struct JudgedSong {
    pub song: SongModel,
    pub tally: VoteTally,
}

/// Service for recording votes on the song that is playing
pub struct VoteService {
    repository: Arc<dyn TrackRepository>,
    event_bus: EventBus,
}

impl VoteService {
    pub fn new(repository: Arc<dyn TrackRepository>, event_bus: EventBus) -> Self {
        Self {
            repository,
            event_bus,
        }
    }

    /// Records one DJ's judgement of the track's judged song
    ///
    /// The judged song is the oldest one not yet scored. Each DJ may vote on
    /// a song once.
    #[instrument(skip(self))]
    pub async fn cast_vote(
        &self,
        track_id: i64,
        dj_id: i64,
        category: VoteCategory,
    ) -> Result<VoteModel, VoteError> {
        self.repository
            .get_track(track_id)
            .await?
            .ok_or(VoteError::TrackNotFound(track_id))?;

        match self.repository.get_dj(dj_id).await? {
            Some(dj) if dj.track_id == track_id => {}
            _ => return Err(VoteError::NotInTrack { track_id, dj_id }),
        }

        let song = self
            .repository
            .find_unscored_song(track_id)
            .await?
            .ok_or(VoteError::NoSongPlaying)?;

        let vote = self
            .repository
            .insert_vote(&NewVote {
                track_id,
                dj_id,
                song_id: song.id,
                category,
            })
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => VoteError::AlreadyVoted {
                    dj_id,
                    song_id: song.id,
                },
                // Scored between the lookup and the insert
                AppError::NotFound(_) => VoteError::NoSongPlaying,
                other => VoteError::Repository(other),
            })?;

        info!(track_id, dj_id, song_id = song.id, category = %category, "Vote cast");
        self.event_bus
            .emit_to_track(
                track_id,
                TrackEvent::VoteCast {
                    dj_id,
                    song_id: song.id,
                    category,
                },
            )
            .await;

        Ok(vote)
    }

    /// Live tally for the song being judged, if any
    #[instrument(skip(self))]
    pub async fn current_tally(&self, track_id: i64) -> Result<Option<JudgedSong>, VoteError> {
        self.repository
            .get_track(track_id)
            .await?
            .ok_or(VoteError::TrackNotFound(track_id))?;

        let Some(song) = self.repository.find_unscored_song(track_id).await? else {
            debug!(track_id, "No song being judged");
            return Ok(None);
        };
        let votes = self.repository.find_votes_for_song(song.id).await?;

        Ok(Some(JudgedSong {
            song,
            tally: VoteTally::from_votes(&votes),
        }))
    }
}
