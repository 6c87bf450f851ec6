use serde::{Deserialize, Serialize};

use crate::scoring::{MajoritySet, VoteTally};
use crate::track::models::{SongModel, VoteCategory};

/// Request payload for judging the song that is playing
#[derive(Debug, Deserialize)]
pub struct CastVoteRequest {
    pub dj_id: i64,
    pub category: VoteCategory,
}

/// Votes so far on the song being judged
#[derive(Debug, Serialize)]
pub struct TallyResponse {
    pub song: Option<SongModel>,
    pub tally: VoteTally,
    pub majority: MajoritySet,
}
