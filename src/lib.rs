// Library crate for the track scoring server
// This file exposes the public API for integration tests

pub mod config;
pub mod event;
pub mod playback;
pub mod router;
pub mod scoring;
pub mod shared;
pub mod song;
pub mod track;
pub mod vote;
pub mod watcher;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use config::AppConfig;
pub use event::{EventBus, TrackEvent};
pub use router::build_router;
pub use scoring::{ScoringOutcome, ScoringService};
pub use shared::{AppError, AppState};
pub use track::repository::{InMemoryTrackRepository, TrackRepository, TrackTransaction};
pub use watcher::{PlaybackWatcher, TickOutcome, TickReport, TrackCheck};
