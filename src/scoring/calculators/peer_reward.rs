use std::collections::HashMap;

use crate::scoring::{CalculationContext, MajoritySet, ScoreCalculator};
use crate::track::models::{DjModel, VoteModel};

const MAJORITY_REWARD: f64 = 0.5;
const PARTICIPATION_REWARD: f64 = 0.25;

/// Bonus earned by each DJ of the track who voted on the song
///
/// Voting with the majority earns more than voting against it; DJs who did
/// not vote are absent from the result.
pub fn peer_rewards(
    djs: &[DjModel],
    votes: &[VoteModel],
    majority: MajoritySet,
) -> HashMap<i64, f64> {
    votes
        .iter()
        .filter(|vote| djs.iter().any(|dj| dj.id == vote.dj_id))
        .map(|vote| {
            let reward = if majority.contains(vote.category) {
                MAJORITY_REWARD
            } else {
                PARTICIPATION_REWARD
            };
            (vote.dj_id, reward)
        })
        .collect()
}

pub struct PeerRewardCalculator;

impl Default for PeerRewardCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRewardCalculator {
    pub fn new() -> Self {
        Self
    }
}

impl ScoreCalculator for PeerRewardCalculator {
    fn calculate(&self, context: &CalculationContext) -> HashMap<i64, f64> {
        peer_rewards(context.djs, context.votes, context.majority)
            .into_iter()
            .map(|(dj_id, reward)| (dj_id, context.current_score(dj_id) + reward))
            .collect()
    }

    fn priority(&self) -> u32 {
        crate::scoring::calculator_priority::PEER_REWARD
    }

    fn name(&self) -> &'static str {
        "PeerRewardCalculator"
    }
}
