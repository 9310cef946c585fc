pub mod fear_greed_client;
pub use fear_greed_client::{FearGreedClient, FearGreedPoint};
