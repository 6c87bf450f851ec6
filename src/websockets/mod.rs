// Public API
pub use handler::track_events_handler;
pub use socket::{Connection, SocketError, SocketWrapper};

// Internal modules
mod handler;
mod socket;
