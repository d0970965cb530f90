//! Integration tests for the data access layer against scripted providers.
//!
//! No network: every provider here is a stub that counts calls and fails on
//! demand.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use hedgeflow_core::data::{
    DataAccess, DataError, DataSource, JsonCache, MarketDataProvider, QuoteSummary, RawBar,
    RawInsiderTransaction, RawOptionChain, RawOptionContract, RetryPolicy, StatementPeriod,
};
use hedgeflow_core::domain::{RecordKind, TradeSide};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn today() -> NaiveDate {
    date(2024, 11, 15)
}

fn range() -> (NaiveDate, NaiveDate) {
    (date(2024, 1, 2), date(2024, 6, 28))
}

// ── Stub provider ────────────────────────────────────────────────────

/// Fails the first `failures` calls (any method) with a transient error,
/// then serves fixed data.
struct ScriptedProvider {
    failures: AtomicU32,
    calls: AtomicU32,
    periods: usize,
}

impl ScriptedProvider {
    fn new(failures: u32) -> Self {
        Self {
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            periods: 2,
        }
    }

    fn with_periods(mut self, periods: usize) -> Self {
        self.periods = periods;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn gate(&self) -> Result<(), DataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(DataError::NetworkUnreachable("connection reset".into()));
        }
        Ok(())
    }
}

fn bars(start: NaiveDate, close: f64) -> Vec<RawBar> {
    (0..5)
        .map(|i| RawBar {
            date: start + chrono::Duration::days(i),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close: close + i as f64 * 0.1,
            volume: 1_000,
            adj_close: close,
        })
        .collect()
}

impl MarketDataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<RawBar>, DataError> {
        self.gate()?;
        Ok(match symbol {
            "^VIX" => bars(start, 20.0),
            "^TNX" => bars(start, 4.2),
            _ => bars(start, 100.0),
        })
    }

    fn quote_summary(&self, _symbol: &str) -> Result<QuoteSummary, DataError> {
        self.gate()?;
        Ok(QuoteSummary {
            market_cap: Some(2.5e12),
            forward_pe: Some(28.0),
            free_cashflow: Some(1.0e11),
            shares_outstanding: Some(1.5e10),
            volume: Some(5.0e7),
            average_volume: Some(6.0e7),
            ..Default::default()
        })
    }

    fn statement_history(&self, _symbol: &str) -> Result<Vec<StatementPeriod>, DataError> {
        self.gate()?;
        let period = |end: NaiveDate, revenue: f64| StatementPeriod {
            end_date: end,
            total_revenue: Some(revenue),
            net_income: Some(revenue * 0.25),
            free_cash_flow: Some(revenue * 0.2),
            depreciation: Some(1.0e9),
            capital_expenditure: Some(-2.0e9),
            total_current_assets: Some(1.5e11),
            total_current_liabilities: Some(1.3e11),
        };
        Ok([
            period(date(2024, 9, 28), 3.9e11),
            period(date(2023, 9, 30), 3.8e11),
        ]
        .into_iter()
        .take(self.periods)
        .collect())
    }

    fn insider_transactions(&self, _symbol: &str) -> Result<Vec<RawInsiderTransaction>, DataError> {
        self.gate()?;
        Ok(vec![
            RawInsiderTransaction {
                date: date(2024, 10, 1),
                shares: -1_000,
                value: Some(200.0),
            },
            RawInsiderTransaction {
                date: date(2024, 10, 5),
                shares: 4_000,
                value: Some(800.0),
            },
        ])
    }

    fn option_chain(&self, _symbol: &str) -> Result<RawOptionChain, DataError> {
        self.gate()?;
        let contract = |volume, iv| RawOptionContract {
            volume: Some(volume),
            open_interest: Some(10),
            implied_volatility: Some(iv),
        };
        Ok(RawOptionChain {
            expiration: date(2024, 11, 22),
            calls: vec![contract(100, 0.4)],
            puts: vec![contract(200, 0.5)],
        })
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Panics on any call: proves a code path never reaches the provider.
struct Unreachable;

impl MarketDataProvider for Unreachable {
    fn name(&self) -> &str {
        "unreachable"
    }
    fn daily_bars(&self, s: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<RawBar>, DataError> {
        panic!("provider called for {s} bars");
    }
    fn quote_summary(&self, s: &str) -> Result<QuoteSummary, DataError> {
        panic!("provider called for {s} quote");
    }
    fn statement_history(&self, s: &str) -> Result<Vec<StatementPeriod>, DataError> {
        panic!("provider called for {s} statements");
    }
    fn insider_transactions(&self, s: &str) -> Result<Vec<RawInsiderTransaction>, DataError> {
        panic!("provider called for {s} insider trades");
    }
    fn option_chain(&self, s: &str) -> Result<RawOptionChain, DataError> {
        panic!("provider called for {s} options");
    }
    fn is_available(&self) -> bool {
        true
    }
}

fn access(provider: Arc<dyn MarketDataProvider>, dir: &std::path::Path) -> DataAccess {
    DataAccess::new(provider, JsonCache::new(dir))
        .with_retry(RetryPolicy::immediate(3))
        .with_today(today())
}

/// Fetch one kind and report its provenance.
fn fetch(data: &DataAccess, kind: RecordKind) -> DataSource {
    let (start, end) = range();
    match kind {
        RecordKind::PriceHistory => data.price_history("AAPL", start, end).source,
        RecordKind::FinancialMetrics => data.financial_metrics("AAPL").source,
        RecordKind::FinancialStatements => data.financial_statements("AAPL").source,
        RecordKind::InsiderTrades => data.insider_trades("AAPL").source,
        RecordKind::MarketData => data.market_data("AAPL").source,
        RecordKind::OptionsData => data.options_data("AAPL").source,
    }
}

// ── Cache ────────────────────────────────────────────────────────────

#[test]
fn cache_hit_never_calls_provider() {
    let dir = tempfile::tempdir().unwrap();
    let live = access(Arc::new(ScriptedProvider::new(0)), dir.path());
    for kind in RecordKind::ALL {
        assert_eq!(fetch(&live, kind), DataSource::Live, "{kind}");
    }

    let cached = access(Arc::new(Unreachable), dir.path());
    for kind in RecordKind::ALL {
        assert_eq!(fetch(&cached, kind), DataSource::Cache, "{kind}");
    }
}

#[test]
fn cached_value_matches_live_value() {
    let dir = tempfile::tempdir().unwrap();
    let (start, end) = range();
    let live = access(Arc::new(ScriptedProvider::new(0)), dir.path());
    let cached = access(Arc::new(Unreachable), dir.path());

    assert_eq!(
        live.price_history("AAPL", start, end).value,
        cached.price_history("AAPL", start, end).value
    );
    assert_eq!(
        live.financial_metrics("AAPL").value,
        cached.financial_metrics("AAPL").value
    );
    assert_eq!(
        live.insider_trades("AAPL").value,
        cached.insider_trades("AAPL").value
    );
}

#[test]
fn price_history_cached_per_range() {
    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(ScriptedProvider::new(0));
    let data = access(provider.clone(), dir.path());

    data.price_history("AAPL", date(2024, 1, 2), date(2024, 3, 1));
    data.price_history("AAPL", date(2024, 1, 2), date(2024, 3, 1));
    data.price_history("AAPL", date(2024, 2, 1), date(2024, 3, 1));
    assert_eq!(provider.calls(), 2);
    assert!(dir
        .path()
        .join("price_history/AAPL/2024-01-02_2024-03-01.json")
        .exists());
}

// ── Retry and fallback ───────────────────────────────────────────────

#[test]
fn retries_absorb_max_retries_failures() {
    for kind in RecordKind::ALL {
        let dir = tempfile::tempdir().unwrap();
        let data = access(Arc::new(ScriptedProvider::new(3)), dir.path());
        assert_eq!(fetch(&data, kind), DataSource::Live, "{kind}");
    }
}

#[test]
fn one_failure_too_many_falls_back() {
    for kind in RecordKind::ALL {
        let dir = tempfile::tempdir().unwrap();
        let data = access(Arc::new(ScriptedProvider::new(4)), dir.path());
        assert_eq!(fetch(&data, kind), DataSource::Fallback, "{kind}");
    }
}

#[test]
fn fallback_shapes_are_zeroed() {
    let dir = tempfile::tempdir().unwrap();
    let data = access(Arc::new(ScriptedProvider::new(u32::MAX)), dir.path());
    let (start, end) = range();

    assert!(data.price_history("AAPL", start, end).value.is_empty());

    let metrics = data.financial_metrics("AAPL").value;
    assert_eq!(metrics.market_cap, 0.0);
    assert_eq!(metrics.data_timestamp, None);
    assert_eq!(metrics.days_since_update, None);
    assert!(!metrics.is_data_recent);

    let statements = data.financial_statements("AAPL").value;
    assert_eq!(statements.len(), 2);
    assert_eq!(statements[0], statements[1]);
    assert_eq!(statements[0].free_cash_flow, 0.0);

    assert!(data.insider_trades("AAPL").value.is_empty());

    let market = data.market_data("AAPL").value;
    assert_eq!(market.vix, 0.0);
    assert_eq!(market.treasury_yield, 0.0);

    let options = data.options_data("AAPL").value;
    assert_eq!(options.put_call_ratio, 0.0);
    assert_eq!(options.expiration_date, None);
}

#[test]
fn permanent_errors_skip_retries() {
    struct NotFound(AtomicU32);

    impl MarketDataProvider for NotFound {
        fn name(&self) -> &str {
            "not-found"
        }
        fn daily_bars(&self, s: &str, _: NaiveDate, _: NaiveDate) -> Result<Vec<RawBar>, DataError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(DataError::SymbolNotFound { symbol: s.into() })
        }
        fn quote_summary(&self, _: &str) -> Result<QuoteSummary, DataError> {
            unreachable!()
        }
        fn statement_history(&self, _: &str) -> Result<Vec<StatementPeriod>, DataError> {
            unreachable!()
        }
        fn insider_transactions(&self, _: &str) -> Result<Vec<RawInsiderTransaction>, DataError> {
            unreachable!()
        }
        fn option_chain(&self, _: &str) -> Result<RawOptionChain, DataError> {
            unreachable!()
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let provider = Arc::new(NotFound(AtomicU32::new(0)));
    let data = access(provider.clone(), dir.path());
    let (start, end) = range();
    assert!(data.price_history("NOPE", start, end).is_degraded());
    assert_eq!(provider.0.load(Ordering::SeqCst), 1);
}

// ── Normalization through the access layer ───────────────────────────

#[test]
fn single_period_statements_are_duplicated() {
    let dir = tempfile::tempdir().unwrap();
    let data = access(
        Arc::new(ScriptedProvider::new(0).with_periods(1)),
        dir.path(),
    );
    let pair = data.financial_statements("AAPL");
    assert_eq!(pair.source, DataSource::Live);
    assert_eq!(pair.value[0], pair.value[1]);
    assert!(pair.value[0].net_income > 0.0);
}

#[test]
fn market_data_combines_reference_series() {
    let dir = tempfile::tempdir().unwrap();
    let data = access(Arc::new(ScriptedProvider::new(0)), dir.path());
    let market = data.market_data("AAPL").value;

    assert!((market.vix - 20.4).abs() < 1e-9);
    assert!((market.vix_50d_avg - 20.2).abs() < 1e-9);
    assert!((market.treasury_yield - 4.6).abs() < 1e-9);
    assert_eq!(market.average_volume, 6.0e7);
}

#[test]
fn metrics_derive_growth_and_recency() {
    let dir = tempfile::tempdir().unwrap();
    let data = access(Arc::new(ScriptedProvider::new(0)), dir.path());
    let m = data.financial_metrics("AAPL").value;

    assert!((m.revenue_growth - (3.9e11 - 3.8e11) / 3.8e11).abs() < 1e-12);
    assert_eq!(m.days_since_update, Some(48));
    assert!(m.is_data_recent);
    assert!((m.free_cash_flow_per_share - 1.0e11 / 1.5e10).abs() < 1e-9);
}

#[test]
fn insider_trades_newest_first() {
    let dir = tempfile::tempdir().unwrap();
    let data = access(Arc::new(ScriptedProvider::new(0)), dir.path());
    let trades = data.insider_trades("AAPL").value;
    assert_eq!(trades[0].date, date(2024, 10, 5));
    assert_eq!(trades[0].transaction_type, TradeSide::Buy);
    assert_eq!(trades[1].transaction_type, TradeSide::Sell);
}
