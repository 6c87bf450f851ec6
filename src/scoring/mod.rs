pub mod calculators;
pub mod ranking;
pub mod service;
pub mod tally;

mod errors;

pub use errors::{PipelineStage, ScoringError};
pub use ranking::{rank_djs, ranking_changes, RankedDj};
pub use service::{ScoringOutcome, ScoringService};
pub use tally::{MajoritySet, VoteTally};

use std::collections::HashMap;

use crate::track::models::{DjModel, SongModel, VoteModel};

/// Priority constants for score calculators.
/// Lower values run first. Later calculators see the scores produced by
/// earlier ones through `CalculationContext::current_scores`.
pub mod calculator_priority {
    /// Points for the DJ who queued the song
    pub const QUEUER_SCORE: u32 = 100;
    /// Participation bonus for everyone who voted
    pub const PEER_REWARD: u32 = 200;
}

pub trait ScoreCalculator: Send + Sync {
    /// Returns the new score of every DJ this calculator touches
    fn calculate(&self, context: &CalculationContext) -> HashMap<i64, f64>;

    fn priority(&self) -> u32;

    fn name(&self) -> &'static str;
}

/// Everything a calculator may look at for one finished song
pub struct CalculationContext<'a> {
    pub song: &'a SongModel,
    pub votes: &'a [VoteModel],
    pub djs: &'a [DjModel],
    pub tally: VoteTally,
    pub majority: MajoritySet,
    pub current_scores: &'a HashMap<i64, f64>,
}

impl<'a> CalculationContext<'a> {
    pub fn new(
        song: &'a SongModel,
        votes: &'a [VoteModel],
        djs: &'a [DjModel],
        current_scores: &'a HashMap<i64, f64>,
    ) -> Self {
        let tally = VoteTally::from_votes(votes);
        Self {
            song,
            votes,
            djs,
            tally,
            majority: tally.majority(),
            current_scores,
        }
    }

    /// Score of a DJ as left by the calculators that already ran
    pub fn current_score(&self, dj_id: i64) -> f64 {
        self.current_scores.get(&dj_id).copied().unwrap_or_default()
    }
}
