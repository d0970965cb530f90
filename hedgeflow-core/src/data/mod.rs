//! Data access layer: provider trait, Yahoo provider, JSON cache, retry
//! policy, circuit breaker and normalization.

pub mod access;
pub mod cache;
pub mod circuit_breaker;
pub mod normalize;
pub mod provider;
pub mod retry;
pub mod yahoo;

pub use access::{CachedPayload, DataAccess, TREASURY_SYMBOL, VIX_SYMBOL};
pub use cache::{CacheKey, CachePolicy, CacheStatus, JsonCache};
pub use circuit_breaker::{BreakerState, CircuitBreaker};
pub use provider::{
    DataError, DataSource, Fetched, MarketDataProvider, QuoteSummary, RawBar,
    RawInsiderTransaction, RawOptionChain, RawOptionContract, StatementPeriod,
};
pub use retry::RetryPolicy;
pub use yahoo::YahooProvider;
