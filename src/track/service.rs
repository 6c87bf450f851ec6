use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::{
    generators::{DjNameGenerator, PetNameDjNameGenerator, RandomTrackIdGenerator, TrackIdGenerator},
    models::{DjModel, NewDj, TrackModel},
    repository::TrackRepository,
    types::{CreateTrackRequest, JoinTrackRequest, UpdateDjRequest},
};
use crate::event::{EventBus, TrackEvent};
use crate::shared::AppError;

const MAX_ID_ATTEMPTS: usize = 10;
const MAX_NAME_ATTEMPTS: usize = 5;

/// Service for track and DJ lifecycle
pub struct TrackService {
    repository: Arc<dyn TrackRepository>,
    event_bus: EventBus,
    id_generator: Arc<dyn TrackIdGenerator>,
    name_generator: Arc<dyn DjNameGenerator>,
}

impl TrackService {
    pub fn new(repository: Arc<dyn TrackRepository>, event_bus: EventBus) -> Self {
        Self::with_generators(
            repository,
            event_bus,
            Arc::new(RandomTrackIdGenerator::new()),
            Arc::new(PetNameDjNameGenerator::new()),
        )
    }

    pub fn with_generators(
        repository: Arc<dyn TrackRepository>,
        event_bus: EventBus,
        id_generator: Arc<dyn TrackIdGenerator>,
        name_generator: Arc<dyn DjNameGenerator>,
    ) -> Self {
        Self {
            repository,
            event_bus,
            id_generator,
            name_generator,
        }
    }

    /// Opens a track under a fresh six-digit id
    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_track(&self, request: CreateTrackRequest) -> Result<TrackModel, AppError> {
        let name = non_blank(&request.name)
            .ok_or_else(|| AppError::BadRequest("Track name must not be empty".to_string()))?;
        if request.refresh_token.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Refresh token must not be empty".to_string(),
            ));
        }

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let track = TrackModel::new(
                self.id_generator.generate(),
                name.to_string(),
                request.refresh_token.clone(),
            );
            match self.repository.create_track(&track).await {
                Ok(()) => {
                    info!(track_id = track.id, "Track created");
                    return Ok(track);
                }
                Err(AppError::Conflict(_)) => {
                    debug!(track_id = track.id, attempt, "Track id taken, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(attempts = MAX_ID_ATTEMPTS, "Could not allocate a free track id");
        Err(AppError::Conflict(
            "Could not allocate a track id".to_string(),
        ))
    }

    #[instrument(skip(self))]
    pub async fn get_track(&self, track_id: i64) -> Result<TrackModel, AppError> {
        self.repository
            .get_track(track_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Track not found".to_string()))
    }

    /// Adds a DJ to a track, generating a name if none was given
    #[instrument(skip(self, request))]
    pub async fn join_track(
        &self,
        track_id: i64,
        request: JoinTrackRequest,
    ) -> Result<DjModel, AppError> {
        self.get_track(track_id).await?;
        let avatar = request.avatar.as_deref().and_then(non_blank).map(str::to_string);

        let dj = match request.name.as_deref().and_then(non_blank) {
            Some(name) => {
                self.repository
                    .create_dj(&NewDj {
                        track_id,
                        name: name.to_string(),
                        avatar,
                    })
                    .await?
            }
            None => self.create_dj_with_generated_name(track_id, avatar).await?,
        };

        info!(track_id, dj_id = dj.id, name = %dj.name, "DJ joined track");
        self.event_bus
            .emit_to_track(track_id, TrackEvent::DjJoined { dj: dj.clone() })
            .await;
        Ok(dj)
    }

    #[instrument(skip(self, request))]
    pub async fn update_dj_profile(
        &self,
        track_id: i64,
        dj_id: i64,
        request: UpdateDjRequest,
    ) -> Result<DjModel, AppError> {
        self.get_dj_in_track(track_id, dj_id).await?;

        let name = match request.name.as_deref() {
            Some(name) => Some(non_blank(name).ok_or_else(|| {
                AppError::BadRequest("DJ name must not be empty".to_string())
            })?),
            None => None,
        };
        if name.is_none() && request.avatar.is_none() {
            return Err(AppError::BadRequest("Nothing to update".to_string()));
        }

        let dj = self
            .repository
            .update_dj_profile(dj_id, name, request.avatar.as_deref())
            .await?;

        debug!(track_id, dj_id, "DJ profile updated");
        self.event_bus
            .emit_to_track(track_id, TrackEvent::DjUpdated { dj: dj.clone() })
            .await;
        Ok(dj)
    }

    /// Takes a DJ out of the track
    ///
    /// The songs they queued and the votes they cast stay as history, so
    /// other DJs' scores and tie-breaks do not change. Their name becomes
    /// free for the next DJ to join.
    #[instrument(skip(self))]
    pub async fn leave_track(&self, track_id: i64, dj_id: i64) -> Result<(), AppError> {
        self.get_dj_in_track(track_id, dj_id).await?;
        self.repository.mark_dj_left(dj_id).await?;

        info!(track_id, dj_id, "DJ left track");
        self.event_bus
            .emit_to_track(track_id, TrackEvent::DjLeft { dj_id })
            .await;
        Ok(())
    }

    /// Deletes the track and everything in it
    #[instrument(skip(self))]
    pub async fn close_track(&self, track_id: i64) -> Result<(), AppError> {
        self.repository.delete_track(track_id).await?;

        info!(track_id, "Track closed");
        self.event_bus
            .emit_to_track(track_id, TrackEvent::TrackClosed { track_id })
            .await;
        self.event_bus.close_track(track_id).await;
        Ok(())
    }

    /// DJs ordered by ranking, unranked DJs last in join order
    #[instrument(skip(self))]
    pub async fn leaderboard(&self, track_id: i64) -> Result<Vec<DjModel>, AppError> {
        self.get_track(track_id).await?;
        let mut djs = self.repository.find_all_djs(track_id).await?;
        djs.sort_by_key(|dj| (!dj.is_ranked(), dj.ranking, dj.id));
        Ok(djs)
    }

    async fn get_dj_in_track(&self, track_id: i64, dj_id: i64) -> Result<DjModel, AppError> {
        match self.repository.get_dj(dj_id).await? {
            Some(dj) if dj.track_id == track_id => Ok(dj),
            _ => Err(AppError::NotFound("DJ not found in track".to_string())),
        }
    }

    async fn create_dj_with_generated_name(
        &self,
        track_id: i64,
        avatar: Option<String>,
    ) -> Result<DjModel, AppError> {
        let mut last_error = AppError::Internal;
        for _ in 0..MAX_NAME_ATTEMPTS {
            let new_dj = NewDj {
                track_id,
                name: self.name_generator.generate(),
                avatar: avatar.clone(),
            };
            match self.repository.create_dj(&new_dj).await {
                Ok(dj) => return Ok(dj),
                Err(e @ AppError::Conflict(_)) => {
                    debug!(track_id, name = %new_dj.name, "Generated DJ name taken, retrying");
                    last_error = e;
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error)
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::models::{NewSong, NewVote, VoteCategory};
    use crate::track::repository::InMemoryTrackRepository;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Hands out ids from a fixed list, repeating the last one
    struct SequenceIdGenerator {
        ids: Vec<i64>,
        next: AtomicI64,
    }

    impl SequenceIdGenerator {
        fn new(ids: Vec<i64>) -> Self {
            Self {
                ids,
                next: AtomicI64::new(0),
            }
        }
    }

    impl TrackIdGenerator for SequenceIdGenerator {
        fn generate(&self) -> i64 {
            let index = self.next.fetch_add(1, Ordering::SeqCst) as usize;
            self.ids[index.min(self.ids.len() - 1)]
        }
    }

    struct FixedNameGenerator(&'static str);

    impl DjNameGenerator for FixedNameGenerator {
        fn generate(&self) -> String {
            self.0.to_string()
        }
    }

    fn service_with(repo: Arc<InMemoryTrackRepository>, ids: Vec<i64>) -> TrackService {
        TrackService::with_generators(
            repo,
            EventBus::new(),
            Arc::new(SequenceIdGenerator::new(ids)),
            Arc::new(FixedNameGenerator("calm-otter")),
        )
    }

    fn create_request(name: &str) -> CreateTrackRequest {
        CreateTrackRequest {
            name: name.to_string(),
            refresh_token: "refresh".to_string(),
        }
    }

    fn join_request(name: Option<&str>) -> JoinTrackRequest {
        JoinTrackRequest {
            name: name.map(str::to_string),
            avatar: None,
        }
    }

    #[tokio::test]
    async fn test_create_track_retries_on_id_collision() {
        let repo = Arc::new(InMemoryTrackRepository::new());
        let service = service_with(repo.clone(), vec![111111, 111111, 222222]);

        let first = service.create_track(create_request("One")).await.unwrap();
        let second = service.create_track(create_request("Two")).await.unwrap();

        assert_eq!(first.id, 111111);
        assert_eq!(second.id, 222222);
        assert_eq!(repo.track_count().await, 2);
    }

    #[tokio::test]
    async fn test_create_track_gives_up_after_repeated_collisions() {
        let repo = Arc::new(InMemoryTrackRepository::new());
        let service = service_with(repo.clone(), vec![333333]);
        service.create_track(create_request("One")).await.unwrap();

        let result = service.create_track(create_request("Two")).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_create_track_rejects_blank_name() {
        let service = service_with(Arc::new(InMemoryTrackRepository::new()), vec![444444]);
        let result = service.create_track(create_request("   ")).await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_join_track_with_and_without_name() {
        let repo = Arc::new(InMemoryTrackRepository::new());
        let service = service_with(repo.clone(), vec![555555]);
        let track = service.create_track(create_request("Party")).await.unwrap();

        let named = service
            .join_track(track.id, join_request(Some("  dj-sam ")))
            .await
            .unwrap();
        let generated = service.join_track(track.id, join_request(None)).await.unwrap();

        assert_eq!(named.name, "dj-sam");
        assert_eq!(generated.name, "calm-otter");
        assert_eq!(named.score, 0.0);
        assert_eq!(named.ranking, 0);
    }

    #[tokio::test]
    async fn test_join_track_rejects_duplicate_name() {
        let repo = Arc::new(InMemoryTrackRepository::new());
        let service = service_with(repo.clone(), vec![666666]);
        let track = service.create_track(create_request("Party")).await.unwrap();
        service
            .join_track(track.id, join_request(Some("sam")))
            .await
            .unwrap();

        let result = service.join_track(track.id, join_request(Some("sam"))).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_join_unknown_track() {
        let service = service_with(Arc::new(InMemoryTrackRepository::new()), vec![777777]);
        let result = service.join_track(999999, join_request(Some("sam"))).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_profile_update_and_leave_are_scoped_to_track() {
        let repo = Arc::new(InMemoryTrackRepository::new());
        let service = service_with(repo.clone(), vec![123123, 321321]);
        let first = service.create_track(create_request("First")).await.unwrap();
        let second = service.create_track(create_request("Second")).await.unwrap();
        let dj = service
            .join_track(first.id, join_request(Some("sam")))
            .await
            .unwrap();

        let wrong_track = service
            .update_dj_profile(
                second.id,
                dj.id,
                UpdateDjRequest {
                    name: Some("alex".to_string()),
                    avatar: None,
                },
            )
            .await;
        assert!(matches!(wrong_track, Err(AppError::NotFound(_))));

        let updated = service
            .update_dj_profile(
                first.id,
                dj.id,
                UpdateDjRequest {
                    name: None,
                    avatar: Some("fox".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "sam");
        assert_eq!(updated.avatar.as_deref(), Some("fox"));

        service.leave_track(first.id, dj.id).await.unwrap();
        assert!(repo.get_dj(dj.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_leave_track_keeps_songs_and_votes() {
        let repo = Arc::new(InMemoryTrackRepository::new());
        let service = service_with(repo.clone(), vec![246246]);
        let track = service.create_track(create_request("Party")).await.unwrap();
        let queuer = service
            .join_track(track.id, join_request(Some("sam")))
            .await
            .unwrap();
        let voter = service
            .join_track(track.id, join_request(Some("alex")))
            .await
            .unwrap();
        let song = repo
            .create_song(&NewSong {
                track_id: track.id,
                dj_id: queuer.id,
                uri: "spotify:track:a".to_string(),
                name: "A".to_string(),
                artist: "Artist".to_string(),
                cover: None,
            })
            .await
            .unwrap();
        repo.insert_vote(&NewVote {
            track_id: track.id,
            dj_id: voter.id,
            song_id: song.id,
            category: VoteCategory::Good,
        })
        .await
        .unwrap();

        service.leave_track(track.id, queuer.id).await.unwrap();
        service.leave_track(track.id, voter.id).await.unwrap();

        let history = repo.find_songs_by_dj(queuer.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].song.id, song.id);
        assert_eq!(history[0].votes.len(), 1);
        assert_eq!(history[0].votes[0].dj_id, voter.id);
        assert_eq!(
            repo.find_unscored_song(track.id).await.unwrap().map(|s| s.id),
            Some(song.id)
        );

        let rejoined = service
            .join_track(track.id, join_request(Some("sam")))
            .await
            .unwrap();
        assert_ne!(rejoined.id, queuer.id);
    }

    #[tokio::test]
    async fn test_close_track_emits_and_deletes() {
        let repo = Arc::new(InMemoryTrackRepository::new());
        let bus = EventBus::new();
        let service = TrackService::with_generators(
            repo.clone(),
            bus.clone(),
            Arc::new(SequenceIdGenerator::new(vec![888888])),
            Arc::new(FixedNameGenerator("calm-otter")),
        );
        let track = service.create_track(create_request("Party")).await.unwrap();
        let mut receiver = bus.subscribe_to_track(track.id).await;

        service.close_track(track.id).await.unwrap();

        assert_eq!(
            receiver.recv().await.unwrap(),
            TrackEvent::TrackClosed { track_id: track.id }
        );
        assert!(repo.get_track(track.id).await.unwrap().is_none());
        assert!(matches!(
            service.close_track(track.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_leaderboard_lists_ranked_first() {
        let repo = Arc::new(InMemoryTrackRepository::new());
        let service = service_with(repo.clone(), vec![999999]);
        let track = service.create_track(create_request("Party")).await.unwrap();
        let unranked = service.join_track(track.id, join_request(Some("a"))).await.unwrap();
        let second = service.join_track(track.id, join_request(Some("b"))).await.unwrap();
        let first = service.join_track(track.id, join_request(Some("c"))).await.unwrap();

        let mut tx = repo.begin().await.unwrap();
        tx.update_dj_score(first.id, 5.0).await.unwrap();
        tx.update_dj_ranking(first.id, 1).await.unwrap();
        tx.update_dj_score(second.id, 2.0).await.unwrap();
        tx.update_dj_ranking(second.id, 2).await.unwrap();
        tx.commit().await.unwrap();

        let board = service.leaderboard(track.id).await.unwrap();

        let ids: Vec<i64> = board.iter().map(|dj| dj.id).collect();
        assert_eq!(ids, vec![first.id, second.id, unranked.id]);
    }
}
