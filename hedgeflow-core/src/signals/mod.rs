//! Composite signal scorers. Pure functions over fetched records.

pub mod fear_greed;
pub mod insider;
pub mod options;
pub mod weighted;

pub use fear_greed::{fear_greed_index, FearGreedParts};
pub use insider::insider_sentiment;
pub use options::options_sentiment;
pub use weighted::{weighted_sentiment, SentimentWeights, SubScores, WeightError, WeightedSentiment};
