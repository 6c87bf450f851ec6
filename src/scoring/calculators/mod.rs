mod peer_reward;
mod queuer_score;

pub use peer_reward::{peer_rewards, PeerRewardCalculator};
pub use queuer_score::{score_after_verdict, QueuerScoreCalculator};
