pub use handlers::{add_song, list_dj_songs};
pub use service::QueueService;

mod handlers;
mod service;
pub mod types;
