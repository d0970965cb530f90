//! Market data provider trait and structured error types.
//!
//! The `MarketDataProvider` trait abstracts over upstream sources so the data
//! access layer can be driven by Yahoo Finance in production and by scripted
//! stubs in tests. Providers return their native shapes (every field
//! optional); normalization into canonical records happens above this trait.
//! Providers make exactly one attempt per call: retrying is the caller's policy.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw daily OHLCV bar from a provider (before validation).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub adj_close: f64,
}

/// Quote-level fundamentals and trading statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuoteSummary {
    pub market_cap: Option<f64>,
    pub forward_pe: Option<f64>,
    pub price_to_book: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub return_on_equity: Option<f64>,
    pub profit_margins: Option<f64>,
    pub operating_margins: Option<f64>,
    pub current_ratio: Option<f64>,
    pub debt_to_equity: Option<f64>,
    pub free_cashflow: Option<f64>,
    pub shares_outstanding: Option<f64>,
    pub trailing_eps: Option<f64>,
    pub price_to_sales: Option<f64>,
    pub volume: Option<f64>,
    pub average_volume: Option<f64>,
    pub fifty_two_week_high: Option<f64>,
    pub fifty_two_week_low: Option<f64>,
}

/// One reporting period across income, cash-flow and balance-sheet statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatementPeriod {
    pub end_date: NaiveDate,
    pub total_revenue: Option<f64>,
    pub net_income: Option<f64>,
    pub free_cash_flow: Option<f64>,
    pub depreciation: Option<f64>,
    pub capital_expenditure: Option<f64>,
    pub total_current_assets: Option<f64>,
    pub total_current_liabilities: Option<f64>,
}

/// One insider transaction as reported upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawInsiderTransaction {
    pub date: NaiveDate,
    pub shares: i64,
    pub value: Option<f64>,
}

/// A single option contract row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawOptionContract {
    pub volume: Option<u64>,
    pub open_interest: Option<u64>,
    pub implied_volatility: Option<f64>,
}

/// Calls and puts for the nearest expiration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOptionChain {
    pub expiration: NaiveDate,
    pub calls: Vec<RawOptionContract>,
    pub puts: Vec<RawOptionContract>,
}

/// Structured error types for data operations.
///
/// These are designed to be displayable in both log lines and rationales.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("rate limited by provider (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("response format changed: {0}")]
    ResponseFormatChanged(String),

    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    #[error("symbol not found: {symbol}")]
    SymbolNotFound { symbol: String },

    #[error("provider returned no {what} for '{symbol}'")]
    EmptyResult { symbol: String, what: String },

    #[error("hard stop: data provider has blocked requests (circuit breaker tripped)")]
    CircuitBreakerTripped,

    #[error("provider unavailable after {attempts} attempts: {last}")]
    ProviderUnavailable {
        attempts: u32,
        #[source]
        last: Box<DataError>,
    },

    #[error("cache error: {0}")]
    CacheError(String),

    #[error("data error: {0}")]
    Other(String),
}

impl DataError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Empty and malformed results, authentication failures and an open
    /// circuit breaker are final: they go straight to the fallback shape.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DataError::NetworkUnreachable(_) | DataError::RateLimited { .. } | DataError::Other(_)
        )
    }

    pub fn empty(symbol: &str, what: &str) -> Self {
        DataError::EmptyResult {
            symbol: symbol.to_string(),
            what: what.to_string(),
        }
    }
}

/// Where a record handed to a caller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Read verbatim from the on-disk cache.
    Cache,
    /// Fetched from the provider during this call.
    Live,
    /// The degraded default shape; the live fetch did not succeed.
    Fallback,
}

/// A record plus its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub source: DataSource,
}

impl<T> Fetched<T> {
    pub fn is_degraded(&self) -> bool {
        self.source == DataSource::Fallback
    }

    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Trait for upstream market data providers.
///
/// Implementations handle the specifics of one source. The cache and retry
/// layers sit above this trait; providers know about neither.
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    /// Daily OHLCV bars for a symbol over a date range (inclusive).
    fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, DataError>;

    /// Quote-level fundamentals and trading statistics.
    fn quote_summary(&self, symbol: &str) -> Result<QuoteSummary, DataError>;

    /// Reporting periods, newest first.
    fn statement_history(&self, symbol: &str) -> Result<Vec<StatementPeriod>, DataError>;

    /// Insider transactions in provider order.
    fn insider_transactions(&self, symbol: &str) -> Result<Vec<RawInsiderTransaction>, DataError>;

    /// Option chain for the nearest expiration.
    fn option_chain(&self, symbol: &str) -> Result<RawOptionChain, DataError>;

    /// Check if the provider is currently available (not rate-limited, not blocked).
    fn is_available(&self) -> bool;
}
