mod task;

pub use task::{start_playback_watcher, WatcherConfig};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::playback::PlaybackProvider;
use crate::scoring::{ScoringOutcome, ScoringService};
use crate::track::models::{SongModel, TrackModel};
use crate::track::repository::TrackRepository;

/// What happened to one track during a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackCheck {
    /// The provider would not hand out an access token
    TokenUnavailable,
    /// Every queued song is already scored
    NothingToScore,
    /// The live queue could not be read
    ProviderUnavailable,
    /// The judged song is still playing, still queued, or nothing is playing
    StillPlaying,
    Scored,
    /// A concurrent run got there first
    AlreadyScored,
    /// Scoring rolled back; the song will be picked up again next tick
    Failed,
    /// Scoring kept failing and the song was marked scored without points
    Abandoned,
}

/// Counts of each result over one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tracks: usize,
    pub scored: usize,
    pub failed: usize,
    pub abandoned: usize,
    pub skipped: usize,
}

impl TickReport {
    fn record(&mut self, check: TrackCheck) {
        self.tracks += 1;
        match check {
            TrackCheck::Scored | TrackCheck::AlreadyScored => self.scored += 1,
            TrackCheck::Failed => self.failed += 1,
            TrackCheck::Abandoned => self.abandoned += 1,
            TrackCheck::TokenUnavailable
            | TrackCheck::NothingToScore
            | TrackCheck::ProviderUnavailable
            | TrackCheck::StillPlaying => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(TickReport),
    /// The previous tick was still running
    Skipped,
}

/// Clears the in-flight flag when a tick ends, even by panic
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Detects songs that finished playing and hands them to the scoring pipeline
pub struct PlaybackWatcher {
    repository: Arc<dyn TrackRepository>,
    provider: Arc<dyn PlaybackProvider>,
    scoring: Arc<ScoringService>,
    in_flight: AtomicBool,
    /// Consecutive failed scoring runs per song id
    failures: Mutex<HashMap<i64, u32>>,
    max_scoring_attempts: u32,
}

impl PlaybackWatcher {
    pub fn new(
        repository: Arc<dyn TrackRepository>,
        provider: Arc<dyn PlaybackProvider>,
        scoring: Arc<ScoringService>,
        max_scoring_attempts: u32,
    ) -> Self {
        Self {
            repository,
            provider,
            scoring,
            in_flight: AtomicBool::new(false),
            failures: Mutex::new(HashMap::new()),
            max_scoring_attempts: max_scoring_attempts.max(1),
        }
    }

    /// Checks every track once, concurrently
    ///
    /// Returns `Skipped` without doing anything if another tick is in flight.
    pub async fn tick(self: &Arc<Self>) -> TickOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous watcher tick still running, skipping");
            return TickOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.in_flight);

        let tracks = match self.repository.find_tracks_needing_check().await {
            Ok(tracks) => tracks,
            Err(e) => {
                error!(error = %e, "Failed to list tracks for playback check");
                return TickOutcome::Completed(TickReport::default());
            }
        };

        let track_ids: Vec<i64> = tracks.iter().map(|track| track.id).collect();
        let handles = tracks.into_iter().map(|track| {
            let watcher = Arc::clone(self);
            tokio::spawn(async move { watcher.inspect_track(&track).await })
        });

        let mut report = TickReport::default();
        let mut judged = HashSet::new();
        let mut complete = true;
        for (track_id, result) in track_ids.into_iter().zip(join_all(handles).await) {
            match result {
                Ok((song_id, check)) => {
                    judged.extend(song_id);
                    report.record(check);
                }
                Err(e) => {
                    error!(track_id, error = %e, "Playback check task panicked");
                    complete = false;
                    report.record(TrackCheck::Failed);
                }
            }
        }

        // Songs no longer judged anywhere were scored, abandoned or deleted
        if complete {
            self.failures
                .lock()
                .await
                .retain(|song_id, _| judged.contains(song_id));
        }

        if report.scored > 0 || report.failed > 0 || report.abandoned > 0 {
            info!(
                tracks = report.tracks,
                scored = report.scored,
                failed = report.failed,
                abandoned = report.abandoned,
                "Watcher tick finished"
            );
        }

        TickOutcome::Completed(report)
    }

    /// Scores the track's judged song if the provider shows it played through
    pub async fn check_track(&self, track: &TrackModel) -> TrackCheck {
        self.inspect_track(track).await.1
    }

    /// Like `check_track`, also naming the song that was judged, if any
    #[instrument(skip(self, track), fields(track_id = track.id))]
    async fn inspect_track(&self, track: &TrackModel) -> (Option<i64>, TrackCheck) {
        let song = match self.repository.find_unscored_song(track.id).await {
            Ok(Some(song)) => song,
            Ok(None) => return (None, TrackCheck::NothingToScore),
            Err(e) => {
                warn!(error = %e, "Failed to load unscored song");
                return (None, TrackCheck::Failed);
            }
        };
        (Some(song.id), self.judge(track, &song).await)
    }

    async fn judge(&self, track: &TrackModel, song: &SongModel) -> TrackCheck {
        let access_token = match self.provider.refresh_access_token(&track.refresh_token).await {
            Ok(token) => token,
            Err(e) => {
                debug!(error = %e, "Token refresh failed, skipping track");
                return TrackCheck::TokenUnavailable;
            }
        };

        let live_queue = match self.provider.get_live_queue(&access_token).await {
            Ok(live_queue) => live_queue,
            Err(e) => {
                warn!(error = %e, "Failed to fetch live queue");
                return TrackCheck::ProviderUnavailable;
            }
        };

        if !live_queue.has_finished(&song.uri) {
            return TrackCheck::StillPlaying;
        }

        debug!(song_id = song.id, uri = %song.uri, "Song finished playing");
        match self.scoring.apply_song_points(track.id, song.id).await {
            Ok(ScoringOutcome::Applied { .. }) => {
                self.failures.lock().await.remove(&song.id);
                TrackCheck::Scored
            }
            Ok(ScoringOutcome::AlreadyApplied { .. }) => {
                self.failures.lock().await.remove(&song.id);
                TrackCheck::AlreadyScored
            }
            Err(_) => self.record_failure(track.id, song).await,
        }
    }

    pub async fn failure_count(&self, song_id: i64) -> u32 {
        self.failures
            .lock()
            .await
            .get(&song_id)
            .copied()
            .unwrap_or_default()
    }

    async fn record_failure(&self, track_id: i64, song: &SongModel) -> TrackCheck {
        let attempts = {
            let mut failures = self.failures.lock().await;
            let attempts = failures.entry(song.id).or_default();
            *attempts += 1;
            *attempts
        };

        if attempts < self.max_scoring_attempts {
            warn!(
                song_id = song.id,
                attempts,
                max_attempts = self.max_scoring_attempts,
                "Scoring failed, will retry next tick"
            );
            return TrackCheck::Failed;
        }

        match self.scoring.abandon_song(track_id, song.id).await {
            Ok(_) => {
                self.failures.lock().await.remove(&song.id);
                error!(
                    song_id = song.id,
                    dj_id = song.dj_id,
                    attempts,
                    "Giving up on scoring song, marked scored without points"
                );
                TrackCheck::Abandoned
            }
            Err(e) => {
                error!(song_id = song.id, error = %e, "Failed to abandon song");
                TrackCheck::Failed
            }
        }
    }
}
