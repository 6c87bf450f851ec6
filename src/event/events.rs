use serde::{Deserialize, Serialize};

use crate::track::models::{DjModel, SongModel, VoteCategory};

/// Events broadcast to everyone following a track
///
/// Events represent facts about things that have already happened and are
/// fire-and-forget: nothing waits for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum TrackEvent {
    /// A DJ record changed (score, ranking or profile)
    DjUpdated { dj: DjModel },

    /// A DJ joined the track
    DjJoined { dj: DjModel },

    /// A DJ left or was removed from the track
    DjLeft { dj_id: i64 },

    /// A song was added to the provider queue
    SongAdded { song: SongModel },

    /// A DJ judged the song that is playing
    VoteCast {
        dj_id: i64,
        song_id: i64,
        category: VoteCategory,
    },

    /// The track was closed by its owner or by the retention sweep
    TrackClosed { track_id: i64 },
}

impl TrackEvent {
    /// Wire name of the event, as seen by real-time subscribers
    pub fn event_name(&self) -> &'static str {
        match self {
            TrackEvent::DjUpdated { .. } => "dj_updated",
            TrackEvent::DjJoined { .. } => "dj_joined",
            TrackEvent::DjLeft { .. } => "dj_left",
            TrackEvent::SongAdded { .. } => "song_added",
            TrackEvent::VoteCast { .. } => "vote_cast",
            TrackEvent::TrackClosed { .. } => "track_closed",
        }
    }
}

/// Topic name subscribers use for a track
pub fn track_topic(track_id: i64) -> String {
    format!("track:{}", track_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_name_tag() {
        let event = TrackEvent::DjLeft { dj_id: 7 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.event_name());
        assert_eq!(json["payload"]["dj_id"], 7);
    }

    #[test]
    fn test_track_topic_format() {
        assert_eq!(track_topic(123456), "track:123456");
    }
}
