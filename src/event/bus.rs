use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::events::{track_topic, TrackEvent};

const TOPIC_CAPACITY: usize = 100;

/// Event bus for distributing track events to real-time subscribers
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    /// Topic-specific event channels: "track:<id>" -> sender
    topics: Arc<RwLock<HashMap<String, broadcast::Sender<TrackEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Emits an event to all subscribers of a track
    pub async fn emit_to_track(&self, track_id: i64, event: TrackEvent) {
        let topic = track_topic(track_id);
        let topics = self.topics.read().await;

        if let Some(sender) = topics.get(&topic) {
            match sender.send(event) {
                Ok(receiver_count) => {
                    debug!(topic = %topic, receivers = receiver_count, "Track event emitted");
                }
                Err(broadcast::error::SendError(event)) => {
                    debug!(
                        topic = %topic,
                        event = event.event_name(),
                        "Track event emitted with no receivers"
                    );
                }
            }
        } else {
            // Nobody has subscribed yet, so nobody can miss this event
            debug!(topic = %topic, event = event.event_name(), "No subscribers for track");
        }
    }

    /// Subscribe to events for a specific track
    pub async fn subscribe_to_track(&self, track_id: i64) -> broadcast::Receiver<TrackEvent> {
        let topic = track_topic(track_id);
        {
            let topics = self.topics.read().await;
            if let Some(sender) = topics.get(&topic) {
                return sender.subscribe();
            }
        }

        debug!(topic = %topic, "Creating new track channel for subscription");
        let mut topics = self.topics.write().await;
        topics
            .entry(topic)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Drops the channel of a closed track; live receivers see the channel close
    pub async fn close_track(&self, track_id: i64) {
        let mut topics = self.topics.write().await;
        topics.remove(&track_topic(track_id));
    }
}
