use std::cmp::Ordering;
use std::collections::HashMap;

use crate::track::models::{DjModel, SongWithVotes, VoteCategory};

use super::VoteTally;

/// A DJ in final ranking order, with the ranking they should hold
#[derive(Debug, Clone, PartialEq)]
pub struct RankedDj {
    pub dj: DjModel,
    pub ranking: i32,
}

impl RankedDj {
    pub fn has_changed(&self) -> bool {
        self.dj.ranking != self.ranking
    }
}

/// Votes received by each DJ across every song they queued
pub fn received_votes(songs: &[SongWithVotes]) -> HashMap<i64, VoteTally> {
    let mut received: HashMap<i64, VoteTally> = HashMap::new();
    for entry in songs {
        let tally = received.entry(entry.song.dj_id).or_default();
        for vote in &entry.votes {
            tally.record(vote.category);
        }
    }
    received
}

/// Total order over DJs: `Less` means `a` ranks above `b`
///
/// Higher score first, then more very_good and good votes received, then
/// fewer very_bad and bad votes received, then the lower id.
pub fn compare(a: &DjModel, b: &DjModel, received: &HashMap<i64, VoteTally>) -> Ordering {
    let empty = VoteTally::default();
    let tally_a = received.get(&a.id).unwrap_or(&empty);
    let tally_b = received.get(&b.id).unwrap_or(&empty);

    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            tally_b
                .count(VoteCategory::VeryGood)
                .cmp(&tally_a.count(VoteCategory::VeryGood))
        })
        .then_with(|| tally_b.count(VoteCategory::Good).cmp(&tally_a.count(VoteCategory::Good)))
        .then_with(|| {
            tally_a
                .count(VoteCategory::VeryBad)
                .cmp(&tally_b.count(VoteCategory::VeryBad))
        })
        .then_with(|| tally_a.count(VoteCategory::Bad).cmp(&tally_b.count(VoteCategory::Bad)))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sorts DJs into ranking order and assigns positional rankings
///
/// A DJ with a score of exactly zero keeps ranking 0 wherever they sort.
pub fn rank_djs(djs: &[DjModel], songs: &[SongWithVotes]) -> Vec<RankedDj> {
    let received = received_votes(songs);
    let mut sorted: Vec<DjModel> = djs.to_vec();
    sorted.sort_by(|a, b| compare(a, b, &received));

    sorted
        .into_iter()
        .enumerate()
        .map(|(position, dj)| {
            let ranking = if dj.score == 0.0 {
                0
            } else {
                position as i32 + 1
            };
            RankedDj { dj, ranking }
        })
        .collect()
}

/// Only the DJs whose ranking differs from the stored one
pub fn ranking_changes(djs: &[DjModel], songs: &[SongWithVotes]) -> Vec<RankedDj> {
    rank_djs(djs, songs)
        .into_iter()
        .filter(RankedDj::has_changed)
        .collect()
}
