use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Track ids are six-digit PINs
pub const MIN_TRACK_ID: i64 = 100_000;
pub const MAX_TRACK_ID: i64 = 999_999;

/// Database model for tracks table (a listening session bound to one playback device)
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackModel {
    pub id: i64, // 6-digit PIN shared with participants
    pub name: String,
    #[serde(skip_serializing)]
    pub refresh_token: String, // Playback provider credential, never sent to clients
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackModel {
    pub fn new(id: i64, name: String, refresh_token: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            refresh_token,
            created_at: now,
            updated_at: now,
        }
    }

    /// Checks if the track has been idle for longer than the given window
    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.updated_at < cutoff
    }
}

/// Database model for djs table
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct DjModel {
    pub id: i64,
    pub track_id: i64,
    pub name: String,
    pub avatar: Option<String>,
    pub score: f64,
    pub ranking: i32, // 0 = unranked, 1 = first place
}

impl DjModel {
    pub fn is_ranked(&self) -> bool {
        self.ranking > 0
    }
}

/// Fields required to insert a new DJ
#[derive(Debug, Clone)]
pub struct NewDj {
    pub track_id: i64,
    pub name: String,
    pub avatar: Option<String>,
}

/// Database model for songs table: one DJ adding one track to the provider queue
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct SongModel {
    pub id: i64,
    pub track_id: i64,
    pub dj_id: i64, // Queuer
    pub uri: String,
    pub name: String,
    pub artist: String,
    pub cover: Option<String>,
    pub points_applied: bool,
}

#[derive(Debug, Clone)]
pub struct NewSong {
    pub track_id: i64,
    pub dj_id: i64,
    pub uri: String,
    pub name: String,
    pub artist: String,
    pub cover: Option<String>,
}

/// Five-point ordinal judgement a DJ gives the song that is playing
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    EnumString,
    AsRefStr,
    Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VoteCategory {
    VeryGood,
    Good,
    Normal,
    Bad,
    VeryBad,
}

impl VoteCategory {
    /// Point value awarded to the queuer when this category wins the vote
    pub fn points(self) -> f64 {
        match self {
            VoteCategory::VeryGood => 3.0,
            VoteCategory::Good => 1.0,
            VoteCategory::Normal => 0.0,
            VoteCategory::Bad => -1.0,
            VoteCategory::VeryBad => -3.0,
        }
    }

    pub fn is_negative(self) -> bool {
        matches!(self, VoteCategory::Bad | VoteCategory::VeryBad)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoteModel {
    pub id: i64,
    pub track_id: i64,
    pub dj_id: i64, // Voter
    pub song_id: i64,
    pub category: VoteCategory,
}

#[derive(Debug, Clone)]
pub struct NewVote {
    pub track_id: i64,
    pub dj_id: i64,
    pub song_id: i64,
    pub category: VoteCategory,
}

/// A song together with every vote cast on it
#[derive(Debug, Clone, Serialize)]
pub struct SongWithVotes {
    pub song: SongModel,
    pub votes: Vec<VoteModel>,
}
