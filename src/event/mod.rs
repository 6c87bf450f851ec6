// Real-time notification plumbing
//
// Everything that mutates a track announces it through the EventBus; the
// transport (websocket, SSE) subscribes per track topic.

pub use bus::EventBus;
pub use events::{track_topic, TrackEvent};

mod bus;
mod events;
