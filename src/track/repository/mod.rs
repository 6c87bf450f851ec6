use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{
    DjModel, NewDj, NewSong, NewVote, SongModel, SongWithVotes, TrackModel, VoteModel,
};
use crate::shared::AppError;

mod memory;
mod postgres;

pub use memory::InMemoryTrackRepository;
pub use postgres::PostgresTrackRepository;

/// Trait for track repository operations
///
/// Owns every row belonging to a track: the track itself, its DJs, the songs
/// they queued and the votes cast on those songs. Score, ranking and
/// `points_applied` mutations only happen through a [`TrackTransaction`].
#[async_trait]
pub trait TrackRepository: Send + Sync {
    /// Inserts a track; fails with `Conflict` if the id is already taken
    async fn create_track(&self, track: &TrackModel) -> Result<(), AppError>;
    async fn get_track(&self, track_id: i64) -> Result<Option<TrackModel>, AppError>;
    /// Tracks the playback watcher should inspect
    async fn find_tracks_needing_check(&self) -> Result<Vec<TrackModel>, AppError>;
    /// Ids of tracks whose `updated_at` is older than the cutoff
    async fn find_idle_tracks(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, AppError>;
    async fn touch_track(&self, track_id: i64) -> Result<(), AppError>;
    /// Deletes a track with all of its DJs, songs and votes
    async fn delete_track(&self, track_id: i64) -> Result<(), AppError>;

    /// Inserts a DJ; fails with `Conflict` if a DJ still in the track has the name
    async fn create_dj(&self, dj: &NewDj) -> Result<DjModel, AppError>;
    /// A DJ still in their track; DJs who left read as `None`
    async fn get_dj(&self, dj_id: i64) -> Result<Option<DjModel>, AppError>;
    async fn update_dj_profile(
        &self,
        dj_id: i64,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<DjModel, AppError>;
    /// Takes a DJ out of the track
    ///
    /// The songs they queued and the votes they cast stay, since other DJs'
    /// verdicts and ranking tie-breaks are computed from them. Their name is
    /// free to be taken again.
    async fn mark_dj_left(&self, dj_id: i64) -> Result<(), AppError>;
    /// DJs still in the track
    async fn find_all_djs(&self, track_id: i64) -> Result<Vec<DjModel>, AppError>;

    async fn create_song(&self, song: &NewSong) -> Result<SongModel, AppError>;
    /// The oldest song of the track that has not been scored yet
    async fn find_unscored_song(&self, track_id: i64) -> Result<Option<SongModel>, AppError>;
    async fn find_votes_for_song(&self, song_id: i64) -> Result<Vec<VoteModel>, AppError>;
    /// Every song a DJ queued, oldest first, with the votes cast on it
    async fn find_songs_by_dj(&self, dj_id: i64) -> Result<Vec<SongWithVotes>, AppError>;

    /// Inserts a vote on a song that is not scored yet
    ///
    /// Fails with `Conflict` if the voter already judged the song and with
    /// `NotFound` if the song is missing or was scored in the meantime.
    async fn insert_vote(&self, vote: &NewVote) -> Result<VoteModel, AppError>;

    /// Opens a transaction; nothing written through it is visible until commit
    async fn begin(&self) -> Result<Box<dyn TrackTransaction>, AppError>;
}

/// Reads and writes that take part in one scoring transaction
///
/// Writes report the number of affected rows so the caller can treat a
/// vanished row as a failure. Dropping a transaction without committing
/// discards its writes.
#[async_trait]
pub trait TrackTransaction: Send {
    async fn get_song(&mut self, song_id: i64) -> Result<Option<SongModel>, AppError>;
    async fn find_all_songs_with_votes(
        &mut self,
        track_id: i64,
    ) -> Result<Vec<SongWithVotes>, AppError>;
    /// DJs still in the track
    async fn find_all_djs(&mut self, track_id: i64) -> Result<Vec<DjModel>, AppError>;
    async fn update_dj_score(&mut self, dj_id: i64, score: f64) -> Result<u64, AppError>;
    async fn update_dj_ranking(&mut self, dj_id: i64, ranking: i32) -> Result<u64, AppError>;
    async fn mark_song_scored(&mut self, song_id: i64) -> Result<u64, AppError>;
    async fn touch_track(&mut self, track_id: i64) -> Result<u64, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
    async fn rollback(self: Box<Self>) -> Result<(), AppError>;
}
