use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{DjModel, TrackModel};

/// Request payload for opening a new track
#[derive(Debug, Deserialize)]
pub struct CreateTrackRequest {
    pub name: String,
    /// Playback provider credential of the track owner
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TrackResponse {
    pub id: i64,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl From<TrackModel> for TrackResponse {
    fn from(track: TrackModel) -> Self {
        Self {
            id: track.id,
            name: track.name,
            created_at: track.created_at,
        }
    }
}

/// Request payload for joining a track; a name is generated when absent
#[derive(Debug, Default, Deserialize)]
pub struct JoinTrackRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDjRequest {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// DJs of a track, ranked first then unranked
#[derive(Debug, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    pub track_id: i64,
    pub djs: Vec<DjModel>,
}
