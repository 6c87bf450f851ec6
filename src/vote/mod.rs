pub use handlers::{cast_vote, current_tally};
pub use service::{VoteError, VoteService};

mod handlers;
mod service;
pub mod types;
