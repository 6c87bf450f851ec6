use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};

use super::{TrackRepository, TrackTransaction};
use crate::shared::AppError;
use crate::track::models::{
    DjModel, NewDj, NewSong, NewVote, SongModel, SongWithVotes, TrackModel, VoteModel,
};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tracks: BTreeMap<i64, TrackModel>,
    djs: BTreeMap<i64, DjModel>,
    /// DJs who left; kept so their songs and votes still resolve
    departed: BTreeMap<i64, DjModel>,
    songs: BTreeMap<i64, SongModel>,
    votes: BTreeMap<i64, VoteModel>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn djs_of(&self, track_id: i64) -> Vec<DjModel> {
        self.djs
            .values()
            .filter(|dj| dj.track_id == track_id)
            .cloned()
            .collect()
    }

    fn with_votes(&self, song: &SongModel) -> SongWithVotes {
        SongWithVotes {
            song: song.clone(),
            votes: self
                .votes
                .values()
                .filter(|vote| vote.song_id == song.id)
                .cloned()
                .collect(),
        }
    }

    fn songs_with_votes(&self, track_id: i64) -> Vec<SongWithVotes> {
        self.songs
            .values()
            .filter(|song| song.track_id == track_id)
            .map(|song| self.with_votes(song))
            .collect()
    }

    fn touch(&mut self, track_id: i64) -> u64 {
        match self.tracks.get_mut(&track_id) {
            Some(track) => {
                track.updated_at = Utc::now();
                1
            }
            None => 0,
        }
    }
}

/// In-memory implementation of TrackRepository for development and testing
///
/// Transactions take the state lock for their whole lifetime and work on a
/// staged copy, so readers never observe a half-applied scoring run. Data is
/// lost when the application restarts.
pub struct InMemoryTrackRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for InMemoryTrackRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTrackRepository {
    /// Creates a new empty in-memory repository
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Returns the current number of tracks in the repository
    pub async fn track_count(&self) -> usize {
        self.state.lock().await.tracks.len()
    }

    /// Overrides a track's last-update timestamp (useful for retention tests)
    pub async fn set_track_updated_at(&self, track_id: i64, updated_at: DateTime<Utc>) {
        if let Some(track) = self.state.lock().await.tracks.get_mut(&track_id) {
            track.updated_at = updated_at;
        }
    }
}

#[async_trait]
impl TrackRepository for InMemoryTrackRepository {
    #[instrument(skip(self, track))]
    async fn create_track(&self, track: &TrackModel) -> Result<(), AppError> {
        debug!(track_id = track.id, "Creating track in memory");

        let mut state = self.state.lock().await;
        if state.tracks.contains_key(&track.id) {
            warn!(track_id = track.id, "Track already exists in memory");
            return Err(AppError::Conflict("Track already exists".to_string()));
        }
        state.tracks.insert(track.id, track.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_track(&self, track_id: i64) -> Result<Option<TrackModel>, AppError> {
        let state = self.state.lock().await;
        Ok(state.tracks.get(&track_id).cloned())
    }

    async fn find_tracks_needing_check(&self) -> Result<Vec<TrackModel>, AppError> {
        let state = self.state.lock().await;
        Ok(state.tracks.values().cloned().collect())
    }

    async fn find_idle_tracks(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .tracks
            .values()
            .filter(|track| track.is_idle_since(cutoff))
            .map(|track| track.id)
            .collect())
    }

    #[instrument(skip(self))]
    async fn touch_track(&self, track_id: i64) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        if state.touch(track_id) == 0 {
            return Err(AppError::NotFound("Track not found".to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_track(&self, track_id: i64) -> Result<(), AppError> {
        debug!(track_id, "Deleting track from memory");

        let mut state = self.state.lock().await;
        if state.tracks.remove(&track_id).is_none() {
            warn!(track_id, "Track not found for deletion in memory");
            return Err(AppError::NotFound("Track not found".to_string()));
        }
        state.djs.retain(|_, dj| dj.track_id != track_id);
        state.departed.retain(|_, dj| dj.track_id != track_id);
        state.songs.retain(|_, song| song.track_id != track_id);
        state.votes.retain(|_, vote| vote.track_id != track_id);
        Ok(())
    }

    #[instrument(skip(self, dj))]
    async fn create_dj(&self, dj: &NewDj) -> Result<DjModel, AppError> {
        let mut state = self.state.lock().await;
        if !state.tracks.contains_key(&dj.track_id) {
            return Err(AppError::NotFound("Track not found".to_string()));
        }
        if state
            .djs
            .values()
            .any(|existing| existing.track_id == dj.track_id && existing.name == dj.name)
        {
            return Err(AppError::Conflict(format!(
                "DJ name '{}' is already taken",
                dj.name
            )));
        }

        let created = DjModel {
            id: state.next_id(),
            track_id: dj.track_id,
            name: dj.name.clone(),
            avatar: dj.avatar.clone(),
            score: 0.0,
            ranking: 0,
        };
        state.djs.insert(created.id, created.clone());
        state.touch(dj.track_id);

        debug!(dj_id = created.id, track_id = dj.track_id, "DJ created in memory");
        Ok(created)
    }

    async fn get_dj(&self, dj_id: i64) -> Result<Option<DjModel>, AppError> {
        let state = self.state.lock().await;
        Ok(state.djs.get(&dj_id).cloned())
    }

    #[instrument(skip(self))]
    async fn update_dj_profile(
        &self,
        dj_id: i64,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<DjModel, AppError> {
        let mut state = self.state.lock().await;
        let track_id = match state.djs.get(&dj_id) {
            Some(dj) => dj.track_id,
            None => return Err(AppError::NotFound("DJ not found".to_string())),
        };

        if let Some(name) = name {
            if state
                .djs
                .values()
                .any(|other| other.id != dj_id && other.track_id == track_id && other.name == name)
            {
                return Err(AppError::Conflict(format!(
                    "DJ name '{}' is already taken",
                    name
                )));
            }
        }

        let updated = {
            let Some(dj) = state.djs.get_mut(&dj_id) else {
                return Err(AppError::NotFound("DJ not found".to_string()));
            };
            if let Some(name) = name {
                dj.name = name.to_string();
            }
            if let Some(avatar) = avatar {
                dj.avatar = Some(avatar.to_string());
            }
            dj.clone()
        };
        state.touch(track_id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    async fn mark_dj_left(&self, dj_id: i64) -> Result<(), AppError> {
        let mut state = self.state.lock().await;
        let Some(mut dj) = state.djs.remove(&dj_id) else {
            return Err(AppError::NotFound("DJ not found".to_string()));
        };
        dj.ranking = 0;
        let track_id = dj.track_id;
        state.departed.insert(dj_id, dj);
        state.touch(track_id);
        Ok(())
    }

    async fn find_all_djs(&self, track_id: i64) -> Result<Vec<DjModel>, AppError> {
        let state = self.state.lock().await;
        Ok(state.djs_of(track_id))
    }

    #[instrument(skip(self, song))]
    async fn create_song(&self, song: &NewSong) -> Result<SongModel, AppError> {
        let mut state = self.state.lock().await;
        match state.djs.get(&song.dj_id) {
            Some(dj) if dj.track_id == song.track_id => {}
            _ => return Err(AppError::NotFound("DJ not found in track".to_string())),
        }

        let created = SongModel {
            id: state.next_id(),
            track_id: song.track_id,
            dj_id: song.dj_id,
            uri: song.uri.clone(),
            name: song.name.clone(),
            artist: song.artist.clone(),
            cover: song.cover.clone(),
            points_applied: false,
        };
        state.songs.insert(created.id, created.clone());
        state.touch(song.track_id);
        Ok(created)
    }

    async fn find_unscored_song(&self, track_id: i64) -> Result<Option<SongModel>, AppError> {
        let state = self.state.lock().await;
        // BTreeMap iterates in id order, so the first match is the oldest
        Ok(state
            .songs
            .values()
            .find(|song| song.track_id == track_id && !song.points_applied)
            .cloned())
    }

    async fn find_votes_for_song(&self, song_id: i64) -> Result<Vec<VoteModel>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .votes
            .values()
            .filter(|vote| vote.song_id == song_id)
            .cloned()
            .collect())
    }

    async fn find_songs_by_dj(&self, dj_id: i64) -> Result<Vec<SongWithVotes>, AppError> {
        let state = self.state.lock().await;
        Ok(state
            .songs
            .values()
            .filter(|song| song.dj_id == dj_id)
            .map(|song| state.with_votes(song))
            .collect())
    }

    #[instrument(skip(self, vote))]
    async fn insert_vote(&self, vote: &NewVote) -> Result<VoteModel, AppError> {
        let mut state = self.state.lock().await;
        // Same guarantee as the (dj_id, song_id) unique key in Postgres
        if state
            .votes
            .values()
            .any(|existing| existing.dj_id == vote.dj_id && existing.song_id == vote.song_id)
        {
            return Err(AppError::Conflict("Vote already cast".to_string()));
        }
        // Checked under the same lock the scoring transaction holds
        match state.songs.get(&vote.song_id) {
            Some(song) if !song.points_applied => {}
            Some(_) => return Err(AppError::NotFound("Song was already scored".to_string())),
            None => return Err(AppError::NotFound("Song not found".to_string())),
        }

        let created = VoteModel {
            id: state.next_id(),
            track_id: vote.track_id,
            dj_id: vote.dj_id,
            song_id: vote.song_id,
            category: vote.category,
        };
        state.votes.insert(created.id, created.clone());
        state.touch(vote.track_id);
        Ok(created)
    }

    async fn begin(&self) -> Result<Box<dyn TrackTransaction>, AppError> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();
        Ok(Box::new(InMemoryTransaction { guard, staged }))
    }
}

/// Holds the repository lock until commit or rollback
struct InMemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl TrackTransaction for InMemoryTransaction {
    async fn get_song(&mut self, song_id: i64) -> Result<Option<SongModel>, AppError> {
        Ok(self.staged.songs.get(&song_id).cloned())
    }

    async fn find_all_songs_with_votes(
        &mut self,
        track_id: i64,
    ) -> Result<Vec<SongWithVotes>, AppError> {
        Ok(self.staged.songs_with_votes(track_id))
    }

    async fn find_all_djs(&mut self, track_id: i64) -> Result<Vec<DjModel>, AppError> {
        Ok(self.staged.djs_of(track_id))
    }

    async fn update_dj_score(&mut self, dj_id: i64, score: f64) -> Result<u64, AppError> {
        match self.staged.djs.get_mut(&dj_id) {
            Some(dj) => {
                dj.score = score;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn update_dj_ranking(&mut self, dj_id: i64, ranking: i32) -> Result<u64, AppError> {
        match self.staged.djs.get_mut(&dj_id) {
            Some(dj) => {
                dj.ranking = ranking;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn mark_song_scored(&mut self, song_id: i64) -> Result<u64, AppError> {
        match self.staged.songs.get_mut(&song_id) {
            Some(song) if !song.points_applied => {
                song.points_applied = true;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn touch_track(&mut self, track_id: i64) -> Result<u64, AppError> {
        Ok(self.staged.touch(track_id))
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let InMemoryTransaction { mut guard, staged } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        Ok(())
    }
}
