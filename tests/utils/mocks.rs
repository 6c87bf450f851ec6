use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use trackdj::{
    playback::{LiveQueue, PlaybackError, PlaybackItem, PlaybackProvider},
    track::models::{
        DjModel, NewDj, NewSong, NewVote, SongModel, SongWithVotes, TrackModel, VoteModel,
    },
    AppError, InMemoryTrackRepository, TrackRepository, TrackTransaction,
};

// ============================================================================
// Mock Playback Provider
// ============================================================================

/// Scriptable player, one live queue per refresh token
#[derive(Clone, Default)]
pub struct MockPlaybackProvider {
    queues: Arc<RwLock<HashMap<String, LiveQueue>>>,
    rejected_tokens: Arc<RwLock<HashSet<String>>>,
    broken_queues: Arc<RwLock<HashSet<String>>>,
    enqueued: Arc<RwLock<Vec<String>>>,
    queue_delay: Arc<RwLock<Option<Duration>>>,
    queue_fetches: Arc<AtomicUsize>,
}

impl MockPlaybackProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn access_token_for(refresh_token: &str) -> String {
        format!("access-{}", refresh_token)
    }

    /// Makes the player of `refresh_token` report `playing` with `queued` after it
    pub async fn set_playing(&self, refresh_token: &str, playing: Option<&str>, queued: &[&str]) {
        let live_queue = LiveQueue {
            currently_playing: playing.map(PlaybackItem::new),
            queued: queued.iter().copied().map(PlaybackItem::new).collect(),
        };
        self.queues
            .write()
            .await
            .insert(Self::access_token_for(refresh_token), live_queue);
    }

    pub async fn reject_token(&self, refresh_token: &str) {
        self.rejected_tokens
            .write()
            .await
            .insert(refresh_token.to_string());
    }

    /// Live queue reads for this player fail with an API error
    pub async fn break_queue(&self, refresh_token: &str) {
        self.broken_queues
            .write()
            .await
            .insert(Self::access_token_for(refresh_token));
    }

    pub async fn set_queue_delay(&self, delay: Duration) {
        *self.queue_delay.write().await = Some(delay);
    }

    pub async fn enqueued(&self) -> Vec<String> {
        self.enqueued.read().await.clone()
    }

    pub fn queue_fetches(&self) -> usize {
        self.queue_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlaybackProvider for MockPlaybackProvider {
    async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, PlaybackError> {
        if self.rejected_tokens.read().await.contains(refresh_token) {
            return Err(PlaybackError::TokenRefresh("invalid_grant".to_string()));
        }
        Ok(Self::access_token_for(refresh_token))
    }

    async fn get_live_queue(&self, access_token: &str) -> Result<LiveQueue, PlaybackError> {
        self.queue_fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.queue_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.broken_queues.read().await.contains(access_token) {
            return Err(PlaybackError::Api {
                status: 503,
                message: "Service unavailable".to_string(),
            });
        }
        Ok(self
            .queues
            .read()
            .await
            .get(access_token)
            .cloned()
            .unwrap_or_default())
    }

    async fn enqueue(&self, _access_token: &str, uri: &str) -> Result<(), PlaybackError> {
        self.enqueued.write().await.push(uri.to_string());
        Ok(())
    }
}

// ============================================================================
// Fault-injecting Repository
// ============================================================================

/// Writes the wrapped repository should pretend found no row
#[derive(Debug, Clone, Default)]
pub struct Faults {
    pub score_update_for: Option<i64>,
    pub ranking_update_for: Option<i64>,
    pub mark_scored: bool,
    /// Song reported as judged even after it was scored
    pub stale_judged_song: Option<SongModel>,
}

/// In-memory repository whose transactions can be told to lose rows
#[derive(Clone)]
pub struct FaultyTrackRepository {
    inner: Arc<InMemoryTrackRepository>,
    faults: Arc<RwLock<Faults>>,
}

impl FaultyTrackRepository {
    pub fn new(inner: Arc<InMemoryTrackRepository>) -> Self {
        Self {
            inner,
            faults: Arc::new(RwLock::new(Faults::default())),
        }
    }

    pub async fn set_faults(&self, faults: Faults) {
        *self.faults.write().await = faults;
    }

    pub async fn clear_faults(&self) {
        self.set_faults(Faults::default()).await;
    }
}

#[async_trait]
impl TrackRepository for FaultyTrackRepository {
    async fn create_track(&self, track: &TrackModel) -> Result<(), AppError> {
        self.inner.create_track(track).await
    }

    async fn get_track(&self, track_id: i64) -> Result<Option<TrackModel>, AppError> {
        self.inner.get_track(track_id).await
    }

    async fn find_tracks_needing_check(&self) -> Result<Vec<TrackModel>, AppError> {
        self.inner.find_tracks_needing_check().await
    }

    async fn find_idle_tracks(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>, AppError> {
        self.inner.find_idle_tracks(cutoff).await
    }

    async fn touch_track(&self, track_id: i64) -> Result<(), AppError> {
        self.inner.touch_track(track_id).await
    }

    async fn delete_track(&self, track_id: i64) -> Result<(), AppError> {
        self.inner.delete_track(track_id).await
    }

    async fn create_dj(&self, dj: &NewDj) -> Result<DjModel, AppError> {
        self.inner.create_dj(dj).await
    }

    async fn get_dj(&self, dj_id: i64) -> Result<Option<DjModel>, AppError> {
        self.inner.get_dj(dj_id).await
    }

    async fn update_dj_profile(
        &self,
        dj_id: i64,
        name: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<DjModel, AppError> {
        self.inner.update_dj_profile(dj_id, name, avatar).await
    }

    async fn mark_dj_left(&self, dj_id: i64) -> Result<(), AppError> {
        self.inner.mark_dj_left(dj_id).await
    }

    async fn find_all_djs(&self, track_id: i64) -> Result<Vec<DjModel>, AppError> {
        self.inner.find_all_djs(track_id).await
    }

    async fn create_song(&self, song: &NewSong) -> Result<SongModel, AppError> {
        self.inner.create_song(song).await
    }

    async fn find_unscored_song(&self, track_id: i64) -> Result<Option<SongModel>, AppError> {
        if let Some(song) = self.faults.read().await.stale_judged_song.clone() {
            return Ok(Some(song));
        }
        self.inner.find_unscored_song(track_id).await
    }

    async fn find_songs_by_dj(&self, dj_id: i64) -> Result<Vec<SongWithVotes>, AppError> {
        self.inner.find_songs_by_dj(dj_id).await
    }

    async fn find_votes_for_song(&self, song_id: i64) -> Result<Vec<VoteModel>, AppError> {
        self.inner.find_votes_for_song(song_id).await
    }

    async fn insert_vote(&self, vote: &NewVote) -> Result<VoteModel, AppError> {
        self.inner.insert_vote(vote).await
    }

    async fn begin(&self) -> Result<Box<dyn TrackTransaction>, AppError> {
        let faults = self.faults.read().await.clone();
        let inner = self.inner.begin().await?;
        Ok(Box::new(FaultyTransaction { inner, faults }))
    }
}

struct FaultyTransaction {
    inner: Box<dyn TrackTransaction>,
    faults: Faults,
}

#[async_trait]
impl TrackTransaction for FaultyTransaction {
    async fn get_song(&mut self, song_id: i64) -> Result<Option<SongModel>, AppError> {
        self.inner.get_song(song_id).await
    }

    async fn find_all_songs_with_votes(
        &mut self,
        track_id: i64,
    ) -> Result<Vec<SongWithVotes>, AppError> {
        self.inner.find_all_songs_with_votes(track_id).await
    }

    async fn find_all_djs(&mut self, track_id: i64) -> Result<Vec<DjModel>, AppError> {
        self.inner.find_all_djs(track_id).await
    }

    async fn update_dj_score(&mut self, dj_id: i64, score: f64) -> Result<u64, AppError> {
        if self.faults.score_update_for == Some(dj_id) {
            return Ok(0);
        }
        self.inner.update_dj_score(dj_id, score).await
    }

    async fn update_dj_ranking(&mut self, dj_id: i64, ranking: i32) -> Result<u64, AppError> {
        if self.faults.ranking_update_for == Some(dj_id) {
            return Ok(0);
        }
        self.inner.update_dj_ranking(dj_id, ranking).await
    }

    async fn mark_song_scored(&mut self, song_id: i64) -> Result<u64, AppError> {
        if self.faults.mark_scored {
            return Ok(0);
        }
        self.inner.mark_song_scored(song_id).await
    }

    async fn touch_track(&mut self, track_id: i64) -> Result<u64, AppError> {
        self.inner.touch_track(track_id).await
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), AppError> {
        self.inner.rollback().await
    }
}
