use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

use trackdj::{
    song::QueueService,
    song::types::AddSongRequest,
    track::models::{DjModel, NewDj, SongModel, TrackModel, VoteCategory},
    vote::VoteService,
    AppState, EventBus, InMemoryTrackRepository, PlaybackWatcher, ScoringService, TickOutcome,
    TickReport, TrackEvent, TrackRepository,
};

use super::mocks::{FaultyTrackRepository, MockPlaybackProvider};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub const TRACK_ID: i64 = 424242;
pub const REFRESH_TOKEN: &str = "owner-refresh";
/// What the player moves on to once a queued song has played through
const NEXT_URI: &str = "spotify:track:somebody-else";

pub struct TestSetup {
    pub repository: Arc<FaultyTrackRepository>,
    pub provider: Arc<MockPlaybackProvider>,
    pub event_bus: EventBus,
    pub scoring: Arc<ScoringService>,
    pub watcher: Arc<PlaybackWatcher>,
    pub track: TrackModel,
    djs: HashMap<String, DjModel>,
}

pub struct TestSetupBuilder {
    djs: Vec<String>,
    max_scoring_attempts: u32,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            djs: vec![],
            max_scoring_attempts: 3,
        }
    }

    pub fn with_djs(mut self, djs: Vec<&str>) -> Self {
        self.djs = djs.into_iter().map(|s| s.to_string()).collect();
        self
    }

    /// The queuer plus three voters
    pub fn with_four_djs(self) -> Self {
        self.with_djs(vec!["alice", "bob", "carol", "dave"])
    }

    pub fn with_max_scoring_attempts(mut self, attempts: u32) -> Self {
        self.max_scoring_attempts = attempts;
        self
    }

    pub async fn build(self) -> TestSetup {
        let repository = Arc::new(FaultyTrackRepository::new(Arc::new(
            InMemoryTrackRepository::new(),
        )));
        let provider = Arc::new(MockPlaybackProvider::new());
        let event_bus = EventBus::new();
        let scoring = Arc::new(ScoringService::builder(repository.clone(), event_bus.clone()).build());
        let watcher = Arc::new(PlaybackWatcher::new(
            repository.clone(),
            provider.clone(),
            scoring.clone(),
            self.max_scoring_attempts,
        ));

        let track = TrackModel::new(
            TRACK_ID,
            "Friday Night".to_string(),
            REFRESH_TOKEN.to_string(),
        );
        repository.create_track(&track).await.unwrap();

        let mut djs = HashMap::new();
        for name in self.djs {
            let dj = repository
                .create_dj(&NewDj {
                    track_id: TRACK_ID,
                    name: name.clone(),
                    avatar: None,
                })
                .await
                .unwrap();
            djs.insert(name, dj);
        }

        TestSetup {
            repository,
            provider,
            event_bus,
            scoring,
            watcher,
            track,
            djs,
        }
    }
}

impl TestSetup {
    pub fn dj(&self, name: &str) -> &DjModel {
        self.djs
            .get(name)
            .unwrap_or_else(|| panic!("no DJ named {}", name))
    }

    /// The DJ as currently stored
    pub async fn stored_dj(&self, name: &str) -> DjModel {
        self.repository
            .get_dj(self.dj(name).id)
            .await
            .unwrap()
            .unwrap()
    }

    pub fn app_state(&self) -> AppState {
        AppState::new(
            self.repository.clone(),
            self.provider.clone(),
            self.event_bus.clone(),
        )
    }

    pub async fn subscribe(&self) -> broadcast::Receiver<TrackEvent> {
        self.event_bus.subscribe_to_track(TRACK_ID).await
    }

    /// Queues a song through the provider and starts it playing
    pub async fn queue_song(&self, dj_name: &str, uri: &str) -> SongModel {
        let service = QueueService::new(
            self.repository.clone(),
            self.provider.clone(),
            self.event_bus.clone(),
        );
        let song = service
            .add_song(
                TRACK_ID,
                AddSongRequest {
                    dj_id: self.dj(dj_name).id,
                    uri: uri.to_string(),
                    name: format!("Song {}", uri),
                    artist: "Artist".to_string(),
                    cover: None,
                },
            )
            .await
            .unwrap();
        self.provider
            .set_playing(REFRESH_TOKEN, Some(uri), &[])
            .await;
        song
    }

    pub async fn vote(&self, dj_name: &str, category: VoteCategory) {
        VoteService::new(self.repository.clone(), self.event_bus.clone())
            .cast_vote(TRACK_ID, self.dj(dj_name).id, category)
            .await
            .unwrap();
    }

    /// The player moves past every song queued so far
    pub async fn finish_playing(&self) {
        self.provider
            .set_playing(REFRESH_TOKEN, Some(NEXT_URI), &[])
            .await;
    }

    pub async fn tick(&self) -> TickReport {
        match self.watcher.tick().await {
            TickOutcome::Completed(report) => report,
            TickOutcome::Skipped => panic!("watcher tick unexpectedly skipped"),
        }
    }

    pub async fn is_scored(&self, song: &SongModel) -> bool {
        let mut tx = self.repository.begin().await.unwrap();
        let stored = tx.get_song(song.id).await.unwrap().unwrap();
        tx.rollback().await.unwrap();
        stored.points_applied
    }
}

/// Drains every event already delivered to the receiver
pub fn drain(receiver: &mut broadcast::Receiver<TrackEvent>) -> Vec<TrackEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

pub fn dj_updates(events: &[TrackEvent]) -> Vec<DjModel> {
    events
        .iter()
        .filter_map(|event| match event {
            TrackEvent::DjUpdated { dj } => Some(dj.clone()),
            _ => None,
        })
        .collect()
}
