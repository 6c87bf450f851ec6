use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use crate::event::{EventBus, TrackEvent};
use crate::track::models::{DjModel, SongModel, SongWithVotes, VoteModel};
use crate::track::repository::{TrackRepository, TrackTransaction};

use super::{
    calculators::{PeerRewardCalculator, QueuerScoreCalculator},
    errors::AtStage,
    ranking_changes, CalculationContext, MajoritySet, PipelineStage, ScoreCalculator,
    ScoringError, VoteTally,
};

/// Result of running the pipeline for one song
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringOutcome {
    Applied {
        song_id: i64,
        tally: VoteTally,
        majority: MajoritySet,
        /// Every score written, keyed by DJ id
        scores: HashMap<i64, f64>,
        /// DJs whose ranking changed, as stored after the update
        reranked: Vec<DjModel>,
    },
    /// Another run already scored the song; nothing was written
    AlreadyApplied { song_id: i64 },
}

/// Writes staged by a run, published once the transaction commits
struct StagedRun {
    outcome: ScoringOutcome,
    events: Vec<TrackEvent>,
}

/// Applies a finished song's votes to DJ scores and rankings
///
/// Every run happens inside one repository transaction: either all score,
/// ranking and `points_applied` writes land together or none do.
pub struct ScoringService {
    calculators: Vec<Arc<dyn ScoreCalculator>>,
    repository: Arc<dyn TrackRepository>,
    event_bus: EventBus,
}

impl ScoringService {
    pub fn builder(repository: Arc<dyn TrackRepository>, event_bus: EventBus) -> ScoringServiceBuilder {
        ScoringServiceBuilder::new(repository, event_bus)
    }

    pub fn calculators(&self) -> Vec<Arc<dyn ScoreCalculator>> {
        self.calculators.clone()
    }

    #[instrument(skip(self))]
    pub async fn apply_song_points(
        &self,
        track_id: i64,
        song_id: i64,
    ) -> Result<ScoringOutcome, ScoringError> {
        let mut tx = self.repository.begin().await.at(PipelineStage::Begin)?;

        let staged = match self.run(tx.as_mut(), track_id, song_id).await {
            Ok(staged) => staged,
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(
                        track_id,
                        song_id,
                        error = %rollback_error,
                        "Rollback after failed scoring run also failed"
                    );
                }
                error!(
                    track_id,
                    song_id,
                    stage = %e.stage(),
                    error = %e,
                    "Scoring pipeline rolled back"
                );
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await.at(PipelineStage::Commit) {
            error!(track_id, song_id, stage = %e.stage(), error = %e, "Scoring commit failed");
            return Err(e);
        }

        for event in staged.events {
            self.event_bus.emit_to_track(track_id, event).await;
        }

        if let ScoringOutcome::Applied { majority, reranked, .. } = &staged.outcome {
            info!(
                track_id,
                song_id,
                majority = ?majority.iter().collect::<Vec<_>>(),
                reranked = reranked.len(),
                "Song points applied"
            );
        }

        Ok(staged.outcome)
    }

    /// Marks a song as scored without touching any DJ
    ///
    /// Used when a song cannot be scored after repeated attempts so it stops
    /// blocking the songs queued after it. Returns false if the song was
    /// already scored.
    #[instrument(skip(self))]
    pub async fn abandon_song(&self, track_id: i64, song_id: i64) -> Result<bool, ScoringError> {
        let mut tx = self.repository.begin().await.at(PipelineStage::Begin)?;

        let marked = match tx.mark_song_scored(song_id).await.at(PipelineStage::MarkScored) {
            Ok(rows) => rows > 0,
            Err(e) => {
                if let Err(rollback_error) = tx.rollback().await {
                    warn!(track_id, song_id, error = %rollback_error, "Rollback failed");
                }
                return Err(e);
            }
        };

        tx.commit().await.at(PipelineStage::Commit)?;
        Ok(marked)
    }

    async fn run(
        &self,
        tx: &mut dyn TrackTransaction,
        track_id: i64,
        song_id: i64,
    ) -> Result<StagedRun, ScoringError> {
        let song = tx
            .get_song(song_id)
            .await
            .at(PipelineStage::LoadVotes)?
            .filter(|song| song.track_id == track_id)
            .ok_or(ScoringError::SongNotFound { track_id, song_id })?;

        if song.points_applied {
            debug!(track_id, song_id, "Song already scored, skipping");
            return Ok(StagedRun {
                outcome: ScoringOutcome::AlreadyApplied { song_id },
                events: Vec::new(),
            });
        }

        let songs = tx
            .find_all_songs_with_votes(track_id)
            .await
            .at(PipelineStage::LoadVotes)?;
        let votes = votes_for(&songs, song_id)
            .ok_or(ScoringError::SongNotFound { track_id, song_id })?;

        let djs = tx
            .find_all_djs(track_id)
            .await
            .at(PipelineStage::ApplyScores)?;
        let (tally, majority, scores) = self.apply_scores(tx, &song, &votes, &djs).await?;

        let reranked = self.apply_rankings(tx, track_id, &songs).await?;

        let rows = tx
            .mark_song_scored(song_id)
            .await
            .at(PipelineStage::MarkScored)?;
        expect_rows(rows, PipelineStage::MarkScored, "song", song_id)?;
        tx.touch_track(track_id)
            .await
            .at(PipelineStage::MarkScored)?;

        let events = reranked
            .iter()
            .cloned()
            .map(|dj| TrackEvent::DjUpdated { dj })
            .collect();

        Ok(StagedRun {
            outcome: ScoringOutcome::Applied {
                song_id,
                tally,
                majority,
                scores,
                reranked,
            },
            events,
        })
    }

    async fn apply_scores(
        &self,
        tx: &mut dyn TrackTransaction,
        song: &SongModel,
        votes: &[VoteModel],
        djs: &[DjModel],
    ) -> Result<(VoteTally, MajoritySet, HashMap<i64, f64>), ScoringError> {
        let mut current_scores: HashMap<i64, f64> =
            djs.iter().map(|dj| (dj.id, dj.score)).collect();
        let mut written: HashMap<i64, f64> = HashMap::new();
        let tally = VoteTally::from_votes(votes);
        let majority = tally.majority();

        for calculator in &self.calculators {
            let updates = {
                let context = CalculationContext::new(song, votes, djs, &current_scores);
                calculator.calculate(&context)
            };

            let mut updates: Vec<(i64, f64)> = updates.into_iter().collect();
            updates.sort_by_key(|(dj_id, _)| *dj_id);

            for (dj_id, score) in updates {
                let rows = tx
                    .update_dj_score(dj_id, score)
                    .await
                    .at(PipelineStage::ApplyScores)?;
                expect_rows(rows, PipelineStage::ApplyScores, "dj", dj_id)?;
                debug!(dj_id, score, calculator = calculator.name(), "Score updated");
                current_scores.insert(dj_id, score);
                written.insert(dj_id, score);
            }
        }

        Ok((tally, majority, written))
    }

    async fn apply_rankings(
        &self,
        tx: &mut dyn TrackTransaction,
        track_id: i64,
        songs: &[SongWithVotes],
    ) -> Result<Vec<DjModel>, ScoringError> {
        let djs = tx
            .find_all_djs(track_id)
            .await
            .at(PipelineStage::RecomputeRankings)?;

        let mut reranked = Vec::new();
        for change in ranking_changes(&djs, songs) {
            let rows = tx
                .update_dj_ranking(change.dj.id, change.ranking)
                .await
                .at(PipelineStage::RecomputeRankings)?;
            expect_rows(rows, PipelineStage::RecomputeRankings, "dj", change.dj.id)?;
            reranked.push(DjModel {
                ranking: change.ranking,
                ..change.dj
            });
        }

        Ok(reranked)
    }
}

fn votes_for(songs: &[SongWithVotes], song_id: i64) -> Option<Vec<VoteModel>> {
    songs
        .iter()
        .find(|entry| entry.song.id == song_id)
        .map(|entry| entry.votes.clone())
}

fn expect_rows(
    rows: u64,
    stage: PipelineStage,
    entity: &'static str,
    id: i64,
) -> Result<(), ScoringError> {
    if rows == 0 {
        return Err(ScoringError::ZeroRowsAffected { stage, entity, id });
    }
    Ok(())
}

pub struct ScoringServiceBuilder {
    calculators: Vec<Arc<dyn ScoreCalculator>>,
    repository: Arc<dyn TrackRepository>,
    event_bus: EventBus,
}

impl ScoringServiceBuilder {
    fn new(repository: Arc<dyn TrackRepository>, event_bus: EventBus) -> Self {
        Self {
            calculators: vec![
                Arc::new(QueuerScoreCalculator::new()),
                Arc::new(PeerRewardCalculator::new()),
            ],
            repository,
            event_bus,
        }
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn ScoreCalculator>) -> Self {
        self.calculators.push(calculator);
        self
    }

    pub fn build(mut self) -> ScoringService {
        self.calculators.sort_by_key(|c| c.priority());
        ScoringService {
            calculators: self.calculators,
            repository: self.repository,
            event_bus: self.event_bus,
        }
    }
}
