//! Canonical record shapes produced by the data access layer.
//!
//! Every kind has all fields present. `Default` is the degraded shape handed
//! out when a live fetch cannot succeed, so consumers never see a missing key.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The six independently fetched record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    PriceHistory,
    FinancialMetrics,
    FinancialStatements,
    InsiderTrades,
    MarketData,
    OptionsData,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        RecordKind::PriceHistory,
        RecordKind::FinancialMetrics,
        RecordKind::FinancialStatements,
        RecordKind::InsiderTrades,
        RecordKind::MarketData,
        RecordKind::OptionsData,
    ];

    /// Directory name used by the on-disk cache.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::PriceHistory => "price_history",
            RecordKind::FinancialMetrics => "financial_metrics",
            RecordKind::FinancialStatements => "financial_statements",
            RecordKind::InsiderTrades => "insider_trades",
            RecordKind::MarketData => "market_data",
            RecordKind::OptionsData => "options_data",
        }
    }

    /// Whether entries of this kind are additionally keyed by a date range.
    pub fn is_date_ranged(&self) -> bool {
        matches!(self, RecordKind::PriceHistory)
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One daily price bar. Dates serialize as `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// Point-in-time financial metrics for a subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub market_cap: f64,
    pub pe_ratio: f64,
    pub price_to_book: f64,
    pub dividend_yield: f64,
    pub revenue: f64,
    pub net_income: f64,
    pub return_on_equity: f64,
    pub net_margin: f64,
    pub operating_margin: f64,
    pub revenue_growth: f64,
    pub earnings_growth: f64,
    pub book_value_growth: f64,
    pub current_ratio: f64,
    pub debt_to_equity: f64,
    pub free_cash_flow_per_share: f64,
    pub earnings_per_share: f64,
    pub price_to_earnings_ratio: f64,
    pub price_to_book_ratio: f64,
    pub price_to_sales_ratio: f64,
    /// End date of the latest reporting period.
    pub data_timestamp: Option<NaiveDate>,
    pub days_since_update: Option<i64>,
    /// True when the latest period ended at most 100 days ago.
    pub is_data_recent: bool,
}

/// Statement line items for one reporting period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub free_cash_flow: f64,
    pub net_income: f64,
    pub depreciation_and_amortization: f64,
    pub capital_expenditure: f64,
    pub working_capital: f64,
}

/// The two most recent periods, newest first. Always exactly two entries;
/// a subject with a single reported period carries it twice.
pub type StatementPair = [LineItem; 2];

/// Direction of an insider transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// A single insider transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderTrade {
    pub transaction_shares: i64,
    pub transaction_type: TradeSide,
    pub value: f64,
    pub date: NaiveDate,
}

/// Aggregate market context for a subject, including the volatility index
/// and the 10-year treasury yield.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub market_cap: f64,
    pub volume: f64,
    pub average_volume: f64,
    pub fifty_two_week_high: f64,
    pub fifty_two_week_low: f64,
    pub vix: f64,
    pub vix_50d_avg: f64,
    pub treasury_yield: f64,
}

/// Option-chain summary for the nearest expiration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionsSnapshot {
    pub expiration_date: Option<NaiveDate>,
    pub put_call_ratio: f64,
    pub avg_call_iv: f64,
    pub avg_put_iv: f64,
    pub total_call_volume: u64,
    pub total_put_volume: u64,
    pub call_open_interest: u64,
    pub put_open_interest: u64,
}
