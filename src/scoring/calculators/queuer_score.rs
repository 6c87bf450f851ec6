use std::collections::HashMap;

use crate::scoring::{CalculationContext, MajoritySet, ScoreCalculator};
use crate::track::models::VoteCategory;

/// New score of the DJ who queued a song, given the song's majority verdict
///
/// The raw delta is the majority category's points, or the mean over tied
/// categories. Low scores are floored so one bad song cannot push a DJ
/// below zero.
pub fn score_after_verdict(majority: MajoritySet, current_score: f64) -> f64 {
    let mut delta = majority.mean_points();

    if delta < 0.0 && current_score == 0.0 && majority.is_all_negative() {
        delta = 0.0;
    }

    if delta < 0.0 {
        // The very_bad clamp takes precedence; the bad clamp is not applied on top
        if current_score < 3.0 && majority.contains(VoteCategory::VeryBad) {
            delta = -current_score;
        } else if current_score < 1.0 && majority.contains(VoteCategory::Bad) {
            delta = -current_score;
        }
    }

    let new_score = current_score + delta;
    if new_score <= 0.0 {
        0.0
    } else {
        new_score
    }
}

pub struct QueuerScoreCalculator;

impl Default for QueuerScoreCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl QueuerScoreCalculator {
    pub fn new() -> Self {
        Self
    }
}

impl ScoreCalculator for QueuerScoreCalculator {
    fn calculate(&self, context: &CalculationContext) -> HashMap<i64, f64> {
        let queuer = context.song.dj_id;
        // A queuer who left keeps their history but no longer scores
        if !context.djs.iter().any(|dj| dj.id == queuer) {
            return HashMap::new();
        }
        let new_score = score_after_verdict(context.majority, context.current_score(queuer));
        HashMap::from([(queuer, new_score)])
    }

    fn priority(&self) -> u32 {
        crate::scoring::calculator_priority::QUEUER_SCORE
    }

    fn name(&self) -> &'static str {
        "QueuerScoreCalculator"
    }
}
