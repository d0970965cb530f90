//! HedgeFlow Core: market records, data access, composite scorers, task graph.
//!
//! This crate contains everything below the analysis stages:
//! - Canonical fetched records and signal verdicts
//! - Cache-first, retrying, never-failing access to six record kinds
//! - Pure composite scorers (fear & greed, options, insider, weighted sentiment)
//! - Price indicators used by scorers and stages
//! - The task graph executor that runs stages concurrently over a shared record

pub mod data;
pub mod domain;
pub mod graph;
pub mod indicators;
pub mod signals;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: types handed across stage threads are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        // Records
        require_send::<domain::PriceBar>();
        require_sync::<domain::PriceBar>();
        require_send::<domain::FinancialMetrics>();
        require_sync::<domain::FinancialMetrics>();
        require_send::<domain::StatementPair>();
        require_sync::<domain::StatementPair>();
        require_send::<domain::InsiderTrade>();
        require_sync::<domain::InsiderTrade>();
        require_send::<domain::MarketSnapshot>();
        require_sync::<domain::MarketSnapshot>();
        require_send::<domain::OptionsSnapshot>();
        require_sync::<domain::OptionsSnapshot>();
        require_send::<domain::CompositeScore>();
        require_sync::<domain::CompositeScore>();

        // Data access
        require_send::<data::DataAccess>();
        require_sync::<data::DataAccess>();
        require_send::<data::JsonCache>();
        require_sync::<data::JsonCache>();
        require_send::<data::CircuitBreaker>();
        require_sync::<data::CircuitBreaker>();
        require_send::<data::YahooProvider>();
        require_sync::<data::YahooProvider>();
        require_send::<data::DataError>();
        require_sync::<data::DataError>();

        // Graph
        require_send::<graph::TaskGraph<u8>>();
        require_sync::<graph::TaskGraph<u8>>();
        require_send::<graph::Record<u8>>();
        require_sync::<graph::Record<u8>>();
        require_send::<graph::StageError>();
        require_sync::<graph::StageError>();
    }

    /// Architecture contract: scorers see only fetched records, never the
    /// data access layer. If a scorer grows a provider parameter this stops
    /// compiling.
    #[test]
    fn scorers_are_pure_functions_of_records() {
        let _fear_greed: fn(&[domain::PriceBar], &domain::MarketSnapshot) -> f64 =
            signals::fear_greed_index;
        let _options: fn(Option<&domain::OptionsSnapshot>) -> domain::CompositeScore =
            signals::options_sentiment;
        let _insider: fn(&[domain::InsiderTrade]) -> domain::CompositeScore =
            signals::insider_sentiment;
    }
}
