//! Cache-first, retrying, never-failing access to the six record kinds.
//!
//! Every fetch follows the same steps: look up the cache key, return a hit
//! verbatim, otherwise call the provider under the retry policy, normalize,
//! write the cache and return. Anything that fails past the retry policy is
//! logged and replaced by the kind's default shape, so callers always get a
//! value together with its [`DataSource`].

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::cache::{CacheKey, JsonCache};
use super::normalize;
use super::provider::{DataError, DataSource, Fetched, MarketDataProvider, RawBar};
use super::retry::RetryPolicy;
use crate::domain::{
    FinancialMetrics, InsiderTrade, MarketSnapshot, OptionsSnapshot, PriceBar, RecordKind,
    StatementPair,
};

/// Reference symbol for the volatility index.
pub const VIX_SYMBOL: &str = "^VIX";
/// Reference symbol for the 10-year treasury yield.
pub const TREASURY_SYMBOL: &str = "^TNX";

/// Calendar days of volatility-index history requested for the snapshot.
const VIX_LOOKBACK_DAYS: i64 = 90;
/// Calendar days of treasury history requested; only the last close is used.
const TREASURY_LOOKBACK_DAYS: i64 = 10;

/// A normalized payload that can live in the cache.
///
/// The default value is the degraded shape handed out when a fetch fails.
pub trait CachedPayload: Serialize + DeserializeOwned + Default {
    /// Payloads reporting empty are returned but never written to the cache.
    fn is_empty_payload(&self) -> bool {
        false
    }
}

impl CachedPayload for Vec<PriceBar> {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl CachedPayload for Vec<InsiderTrade> {
    fn is_empty_payload(&self) -> bool {
        self.is_empty()
    }
}

impl CachedPayload for FinancialMetrics {}
impl CachedPayload for StatementPair {}
impl CachedPayload for MarketSnapshot {}
impl CachedPayload for OptionsSnapshot {}

/// Entry point for every external record a stage needs.
#[derive(Clone)]
pub struct DataAccess {
    provider: Arc<dyn MarketDataProvider>,
    cache: JsonCache,
    retry: RetryPolicy,
    today: Option<NaiveDate>,
}

impl DataAccess {
    pub fn new(provider: Arc<dyn MarketDataProvider>, cache: JsonCache) -> Self {
        Self {
            provider,
            cache,
            retry: RetryPolicy::default(),
            today: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Pin "today" (recency checks and auxiliary lookback windows).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    pub fn cache(&self) -> &JsonCache {
        &self.cache
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Daily bars for `[start, end]`, ascending by date.
    pub fn price_history(
        &self,
        subject: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Fetched<Vec<PriceBar>> {
        let key =
            CacheKey::new(RecordKind::PriceHistory, subject).with_range(format!("{start}_{end}"));
        self.cached_or_fetch(&key, |_| {
            let raw = self.provider.daily_bars(subject, start, end)?;
            normalize::price_bars(subject, raw)
        })
    }

    pub fn financial_metrics(&self, subject: &str) -> Fetched<FinancialMetrics> {
        let key = CacheKey::new(RecordKind::FinancialMetrics, subject);
        let today = self.today();
        self.cached_or_fetch(&key, |_| {
            let quote = self.provider.quote_summary(subject)?;
            let periods = self.provider.statement_history(subject)?;
            normalize::financial_metrics(subject, &quote, &periods, today)
        })
    }

    /// The two most recent reporting periods, newest first. Always two items.
    pub fn financial_statements(&self, subject: &str) -> Fetched<StatementPair> {
        let key = CacheKey::new(RecordKind::FinancialStatements, subject);
        self.cached_or_fetch(&key, |_| {
            let periods = self.provider.statement_history(subject)?;
            normalize::statement_pair(subject, &periods)
        })
    }

    /// Insider trades, newest first.
    pub fn insider_trades(&self, subject: &str) -> Fetched<Vec<InsiderTrade>> {
        let key = CacheKey::new(RecordKind::InsiderTrades, subject);
        self.cached_or_fetch(&key, |_| {
            let raw = self.provider.insider_transactions(subject)?;
            Ok(normalize::insider_trades(raw))
        })
    }

    /// Quote statistics plus the volatility-index and treasury reference series.
    pub fn market_data(&self, subject: &str) -> Fetched<MarketSnapshot> {
        let key = CacheKey::new(RecordKind::MarketData, subject);
        self.cached_or_fetch(&key, |_| {
            let quote = self.provider.quote_summary(subject)?;
            let today = self.today();
            let vix = self.reference_series(
                VIX_SYMBOL,
                today - ChronoDuration::days(VIX_LOOKBACK_DAYS),
                today,
            );
            let treasury = self.reference_series(
                TREASURY_SYMBOL,
                today - ChronoDuration::days(TREASURY_LOOKBACK_DAYS),
                today,
            );
            Ok(normalize::market_snapshot(
                &quote,
                vix.as_deref(),
                treasury.as_deref(),
            ))
        })
    }

    /// Nearest-expiration option chain summary.
    pub fn options_data(&self, subject: &str) -> Fetched<OptionsSnapshot> {
        let key = CacheKey::new(RecordKind::OptionsData, subject);
        self.cached_or_fetch(&key, |_| {
            let chain = self.provider.option_chain(subject)?;
            normalize::options_snapshot(subject, &chain)
        })
    }

    /// An auxiliary series with its own retry budget. Failure only zeroes the
    /// fields derived from it.
    fn reference_series(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Option<Vec<RawBar>> {
        match self
            .retry
            .run(symbol, |_| self.provider.daily_bars(symbol, start, end))
        {
            Ok(bars) => Some(bars),
            Err(e) => {
                warn!(%symbol, error = %e, "reference series unavailable");
                None
            }
        }
    }

    fn cached_or_fetch<T, F>(&self, key: &CacheKey, mut fetch: F) -> Fetched<T>
    where
        T: CachedPayload,
        F: FnMut(u32) -> Result<T, DataError>,
    {
        if let Some(value) = self.cache.read::<T>(key) {
            debug!(%key, "cache hit");
            return Fetched {
                value,
                source: DataSource::Cache,
            };
        }

        let label = key.to_string();
        match self.retry.run(&label, &mut fetch) {
            Ok(value) => {
                if value.is_empty_payload() {
                    debug!(%key, "empty payload, not cached");
                } else if let Err(e) = self.cache.write(key, &value) {
                    warn!(%key, error = %e, "cache write failed");
                }
                info!(%key, provider = self.provider.name(), "fetched live");
                Fetched {
                    value,
                    source: DataSource::Live,
                }
            }
            Err(e) => {
                warn!(%key, error = %e, "fetch failed, using fallback");
                Fetched {
                    value: T::default(),
                    source: DataSource::Fallback,
                }
            }
        }
    }
}
