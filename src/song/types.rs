use serde::{Deserialize, Serialize};

use crate::scoring::VoteTally;
use crate::track::models::SongModel;

/// Request payload for adding a song to the track's queue
#[derive(Debug, Deserialize)]
pub struct AddSongRequest {
    pub dj_id: i64,
    /// Provider URI, e.g. `spotify:track:<id>`
    pub uri: String,
    pub name: String,
    pub artist: String,
    pub cover: Option<String>,
}

/// One song a DJ queued and how it was judged
#[derive(Debug, Serialize)]
pub struct SongHistoryEntry {
    pub song: SongModel,
    pub tally: VoteTally,
}

/// Songs a DJ added to a track, oldest first
#[derive(Debug, Serialize)]
pub struct DjSongsResponse {
    pub dj_id: i64,
    pub songs: Vec<SongHistoryEntry>,
}
