//! Yahoo Finance data provider.
//!
//! Daily bars come from the v8 chart API; fundamentals, statements and
//! insider transactions from the v10 quoteSummary modules; option chains from
//! the v7 options API. Each call is a single HTTP attempt. The circuit breaker
//! is consulted before every request and fed by every response.
//!
//! Yahoo Finance has no official API and is subject to unannounced format
//! changes; parse failures surface as `ResponseFormatChanged`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::circuit_breaker::CircuitBreaker;
use super::provider::{
    DataError, MarketDataProvider, QuoteSummary, RawBar, RawInsiderTransaction, RawOptionChain,
    RawOptionContract, StatementPeriod,
};

const BASE_URL: &str = "https://query2.finance.yahoo.com";

// ── chart API ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjCloseData>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseData {
    adjclose: Vec<Option<f64>>,
}

// ── quoteSummary API ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct QuoteSummaryResponse {
    #[serde(rename = "quoteSummary")]
    quote_summary: QuoteSummaryEnvelope,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryEnvelope {
    result: Option<Vec<QuoteModules>>,
    error: Option<ApiError>,
}

/// `{"raw": 1.0, "fmt": "1.00"}`; Yahoo sends `{}` for unknown values.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
struct Num {
    raw: Option<f64>,
}

fn val(n: &Option<Num>) -> Option<f64> {
    n.and_then(|n| n.raw).filter(|v| v.is_finite())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct QuoteModules {
    summary_detail: Option<SummaryDetail>,
    default_key_statistics: Option<KeyStatistics>,
    financial_data: Option<FinancialData>,
    income_statement_history: Option<IncomeHistory>,
    cashflow_statement_history: Option<CashflowHistory>,
    balance_sheet_history: Option<BalanceHistory>,
    insider_transactions: Option<InsiderHistory>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SummaryDetail {
    market_cap: Option<Num>,
    #[serde(rename = "forwardPE")]
    forward_pe: Option<Num>,
    dividend_yield: Option<Num>,
    volume: Option<Num>,
    average_volume: Option<Num>,
    fifty_two_week_high: Option<Num>,
    fifty_two_week_low: Option<Num>,
    #[serde(rename = "priceToSalesTrailing12Months")]
    price_to_sales: Option<Num>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct KeyStatistics {
    price_to_book: Option<Num>,
    shares_outstanding: Option<Num>,
    trailing_eps: Option<Num>,
    #[serde(rename = "forwardPE")]
    forward_pe: Option<Num>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FinancialData {
    return_on_equity: Option<Num>,
    profit_margins: Option<Num>,
    operating_margins: Option<Num>,
    current_ratio: Option<Num>,
    debt_to_equity: Option<Num>,
    free_cashflow: Option<Num>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IncomeHistory {
    income_statement_history: Vec<IncomeRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IncomeRow {
    end_date: Option<Num>,
    total_revenue: Option<Num>,
    net_income: Option<Num>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CashflowHistory {
    cashflow_statements: Vec<CashflowRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CashflowRow {
    depreciation: Option<Num>,
    capital_expenditures: Option<Num>,
    total_cash_from_operating_activities: Option<Num>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BalanceHistory {
    balance_sheet_statements: Vec<BalanceRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct BalanceRow {
    total_current_assets: Option<Num>,
    total_current_liabilities: Option<Num>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InsiderHistory {
    transactions: Vec<InsiderRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct InsiderRow {
    shares: Option<Num>,
    value: Option<Num>,
    start_date: Option<Num>,
}

// ── options API ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct OptionsResponse {
    #[serde(rename = "optionChain")]
    option_chain: OptionsEnvelope,
}

#[derive(Debug, Deserialize)]
struct OptionsEnvelope {
    result: Option<Vec<OptionsResult>>,
    error: Option<ApiError>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OptionsResult {
    expiration_dates: Vec<i64>,
    options: Vec<OptionsExpiry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OptionsExpiry {
    expiration_date: Option<i64>,
    calls: Vec<OptionRow>,
    puts: Vec<OptionRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct OptionRow {
    volume: Option<f64>,
    open_interest: Option<f64>,
    implied_volatility: Option<f64>,
}

impl From<&OptionRow> for RawOptionContract {
    fn from(row: &OptionRow) -> Self {
        let count = |v: Option<f64>| v.filter(|x| x.is_finite() && *x >= 0.0).map(|x| x as u64);
        RawOptionContract {
            volume: count(row.volume),
            open_interest: count(row.open_interest),
            implied_volatility: row.implied_volatility.filter(|v| v.is_finite()),
        }
    }
}

fn ts_to_date(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.naive_utc().date())
}

fn api_error(symbol: &str, err: Option<ApiError>, context: &str) -> DataError {
    match err {
        Some(err) if err.code == "Not Found" => DataError::SymbolNotFound {
            symbol: symbol.to_string(),
        },
        Some(err) => DataError::ResponseFormatChanged(format!("{}: {}", err.code, err.description)),
        None => DataError::ResponseFormatChanged(format!("{context}: empty result with no error")),
    }
}

/// Yahoo Finance data provider.
pub struct YahooProvider {
    client: reqwest::blocking::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl YahooProvider {
    pub fn new(circuit_breaker: Arc<CircuitBreaker>, timeout: Duration) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            circuit_breaker,
        })
    }

    /// Build the chart API URL for a symbol and date range.
    fn chart_url(symbol: &str, start: NaiveDate, end: NaiveDate) -> String {
        let start_ts = start.and_hms_opt(0, 0, 0).map_or(0, |d| d.and_utc().timestamp());
        let end_ts = end
            .and_hms_opt(23, 59, 59)
            .map_or(0, |d| d.and_utc().timestamp());
        format!(
            "{BASE_URL}/v8/finance/chart/{symbol}\
             ?period1={start_ts}&period2={end_ts}&interval=1d\
             &includeAdjustedClose=true"
        )
    }

    fn quote_summary_url(symbol: &str, modules: &[&str]) -> String {
        format!(
            "{BASE_URL}/v10/finance/quoteSummary/{symbol}?modules={}",
            modules.join(",")
        )
    }

    /// One GET with circuit-breaker bookkeeping and JSON decoding.
    fn get_json<T: DeserializeOwned>(&self, symbol: &str, url: &str) -> Result<T, DataError> {
        if !self.circuit_breaker.is_allowed() {
            return Err(DataError::CircuitBreakerTripped);
        }
        debug!(%symbol, %url, "yahoo request");

        let resp = self.client.get(url).send().map_err(|e| {
            self.circuit_breaker.record_failure();
            DataError::NetworkUnreachable(e.to_string())
        })?;
        let status = resp.status();

        if status == reqwest::StatusCode::FORBIDDEN {
            // IP ban: immediately trip the circuit breaker
            self.circuit_breaker.trip();
            return Err(DataError::CircuitBreakerTripped);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            self.circuit_breaker.record_failure();
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(DataError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(DataError::AuthenticationRequired(
                "Yahoo Finance requires authentication".into(),
            ));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(DataError::SymbolNotFound {
                symbol: symbol.to_string(),
            });
        }

        if !status.is_success() {
            self.circuit_breaker.record_failure();
            return Err(DataError::Other(format!("HTTP {status} for {symbol}")));
        }

        let parsed = resp.json::<T>().map_err(|e| {
            DataError::ResponseFormatChanged(format!("failed to parse response for {symbol}: {e}"))
        })?;
        self.circuit_breaker.record_success();
        Ok(parsed)
    }

    fn quote_modules(&self, symbol: &str, modules: &[&str]) -> Result<QuoteModules, DataError> {
        let resp: QuoteSummaryResponse =
            self.get_json(symbol, &Self::quote_summary_url(symbol, modules))?;
        resp.quote_summary
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| api_error(symbol, resp.quote_summary.error, "quoteSummary"))
    }

    /// Parse the chart API response into RawBars.
    fn parse_chart(symbol: &str, resp: ChartResponse) -> Result<Vec<RawBar>, DataError> {
        let result = resp
            .chart
            .result
            .ok_or_else(|| api_error(symbol, resp.chart.error, "chart"))?;

        let data = result
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("result array is empty".into()))?;

        // A valid symbol with no trading days in range has no timestamps.
        let timestamps = data.timestamp.unwrap_or_default();

        let quote = data
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| DataError::ResponseFormatChanged("no quote data".into()))?;

        let adj_closes = data
            .indicators
            .adjclose
            .and_then(|v| v.into_iter().next())
            .map(|a| a.adjclose);

        let mut bars = Vec::with_capacity(timestamps.len());

        for (i, &ts) in timestamps.iter().enumerate() {
            let date = ts_to_date(ts).ok_or_else(|| {
                DataError::ResponseFormatChanged(format!("invalid timestamp: {ts}"))
            })?;

            let open = quote.open.get(i).copied().flatten();
            let high = quote.high.get(i).copied().flatten();
            let low = quote.low.get(i).copied().flatten();
            let close = quote.close.get(i).copied().flatten();
            let volume = quote.volume.get(i).copied().flatten();
            let adj_close = adj_closes
                .as_ref()
                .and_then(|v| v.get(i).copied().flatten());

            // Skip bars where all OHLCV are None (holidays/non-trading days)
            if open.is_none()
                && high.is_none()
                && low.is_none()
                && close.is_none()
                && volume.is_none()
            {
                continue;
            }

            bars.push(RawBar {
                date,
                open: open.unwrap_or(f64::NAN),
                high: high.unwrap_or(f64::NAN),
                low: low.unwrap_or(f64::NAN),
                close: close.unwrap_or(f64::NAN),
                volume: volume.unwrap_or(0),
                adj_close: adj_close.unwrap_or(f64::NAN),
            });
        }

        Ok(bars)
    }
}

impl MarketDataProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo_finance"
    }

    fn daily_bars(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawBar>, DataError> {
        let chart: ChartResponse = self.get_json(symbol, &Self::chart_url(symbol, start, end))?;
        Self::parse_chart(symbol, chart)
    }

    fn quote_summary(&self, symbol: &str) -> Result<QuoteSummary, DataError> {
        let m = self.quote_modules(
            symbol,
            &["summaryDetail", "defaultKeyStatistics", "financialData"],
        )?;
        let detail = m.summary_detail.unwrap_or_default();
        let stats = m.default_key_statistics.unwrap_or_default();
        let fin = m.financial_data.unwrap_or_default();

        Ok(QuoteSummary {
            market_cap: val(&detail.market_cap),
            forward_pe: val(&detail.forward_pe).or(val(&stats.forward_pe)),
            price_to_book: val(&stats.price_to_book),
            dividend_yield: val(&detail.dividend_yield),
            return_on_equity: val(&fin.return_on_equity),
            profit_margins: val(&fin.profit_margins),
            operating_margins: val(&fin.operating_margins),
            current_ratio: val(&fin.current_ratio),
            debt_to_equity: val(&fin.debt_to_equity),
            free_cashflow: val(&fin.free_cashflow),
            shares_outstanding: val(&stats.shares_outstanding),
            trailing_eps: val(&stats.trailing_eps),
            price_to_sales: val(&detail.price_to_sales),
            volume: val(&detail.volume),
            average_volume: val(&detail.average_volume),
            fifty_two_week_high: val(&detail.fifty_two_week_high),
            fifty_two_week_low: val(&detail.fifty_two_week_low),
        })
    }

    fn statement_history(&self, symbol: &str) -> Result<Vec<StatementPeriod>, DataError> {
        let m = self.quote_modules(
            symbol,
            &[
                "incomeStatementHistory",
                "cashflowStatementHistory",
                "balanceSheetHistory",
            ],
        )?;
        let income = m.income_statement_history.unwrap_or_default();
        let cashflow = m.cashflow_statement_history.unwrap_or_default();
        let balance = m.balance_sheet_history.unwrap_or_default();

        // Yahoo lists the three statements newest-first with matching indices.
        let mut periods = Vec::new();
        for (i, row) in income.income_statement_history.iter().enumerate() {
            let Some(end_date) = val(&row.end_date).and_then(|ts| ts_to_date(ts as i64)) else {
                continue;
            };
            let cf = cashflow.cashflow_statements.get(i);
            let bs = balance.balance_sheet_statements.get(i);
            let operating = cf.and_then(|c| val(&c.total_cash_from_operating_activities));
            let capex = cf.and_then(|c| val(&c.capital_expenditures));

            periods.push(StatementPeriod {
                end_date,
                total_revenue: val(&row.total_revenue),
                net_income: val(&row.net_income),
                // capex is reported negative
                free_cash_flow: operating.map(|op| op + capex.unwrap_or(0.0)),
                depreciation: cf.and_then(|c| val(&c.depreciation)),
                capital_expenditure: capex,
                total_current_assets: bs.and_then(|b| val(&b.total_current_assets)),
                total_current_liabilities: bs.and_then(|b| val(&b.total_current_liabilities)),
            });
        }
        Ok(periods)
    }

    fn insider_transactions(&self, symbol: &str) -> Result<Vec<RawInsiderTransaction>, DataError> {
        let m = self.quote_modules(symbol, &["insiderTransactions"])?;
        Ok(m.insider_transactions
            .unwrap_or_default()
            .transactions
            .iter()
            .filter_map(|row| {
                let date = val(&row.start_date).and_then(|ts| ts_to_date(ts as i64))?;
                Some(RawInsiderTransaction {
                    date,
                    shares: val(&row.shares).unwrap_or(0.0) as i64,
                    value: val(&row.value),
                })
            })
            .collect())
    }

    fn option_chain(&self, symbol: &str) -> Result<RawOptionChain, DataError> {
        let url = format!("{BASE_URL}/v7/finance/options/{symbol}");
        let resp: OptionsResponse = self.get_json(symbol, &url)?;
        let result = resp
            .option_chain
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| api_error(symbol, resp.option_chain.error, "options"))?;

        let expiry = result
            .options
            .into_iter()
            .next()
            .ok_or_else(|| DataError::empty(symbol, "option expirations"))?;
        let expiration = expiry
            .expiration_date
            .or_else(|| result.expiration_dates.first().copied())
            .and_then(ts_to_date)
            .ok_or_else(|| DataError::empty(symbol, "option expirations"))?;

        Ok(RawOptionChain {
            expiration,
            calls: expiry.calls.iter().map(RawOptionContract::from).collect(),
            puts: expiry.puts.iter().map(RawOptionContract::from).collect(),
        })
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
