// Public API - what other modules can use
pub use cleanup_task::{start_cleanup_task, CleanupConfig};
pub use handlers::{close_track, create_track, join_track, leaderboard, leave_track, update_dj};
pub use service::TrackService;

// Internal modules
pub mod cleanup_task;
pub mod generators;
mod handlers;
pub mod models;
pub mod repository;
mod service;
pub mod types;
