//! Values carried in the pipeline's shared record, and the keys they live
//! under.
//!
//! Every key has exactly one variant. Stages read through [`require`], which
//! turns a missing or mistyped key into `StageError::MissingInput`.

use chrono::NaiveDate;
use serde::Serialize;

use hedgeflow_core::domain::{
    FinancialMetrics, InsiderTrade, MarketSnapshot, PriceBar, StatementPair,
};
use hedgeflow_core::graph::{Record, StageError};

use crate::decision::{AgentSignal, Decision, RiskAssessment};
use crate::request::Portfolio;

pub mod keys {
    // Seeded from the request.
    pub const RUN_ID: &str = "run_id";
    pub const SUBJECT: &str = "subject";
    pub const START_DATE: &str = "start_date";
    pub const END_DATE: &str = "end_date";
    pub const PORTFOLIO: &str = "portfolio";
    pub const SHOW_REASONING: &str = "show_reasoning";
    pub const NUM_OF_NEWS: &str = "num_of_news";

    // Written by market_data.
    pub const PRICES: &str = "prices";
    pub const FINANCIAL_METRICS: &str = "financial_metrics";
    pub const STATEMENTS: &str = "financial_line_items";
    pub const INSIDER_TRADES: &str = "insider_trades";
    pub const MARKET: &str = "market_data";
    pub const DATA_GAPS: &str = "data_gaps";

    // Written by the analysis stages, one key per stage.
    pub const TECHNICALS: &str = "technicals";
    pub const FUNDAMENTALS: &str = "fundamentals";
    pub const SENTIMENT: &str = "sentiment";
    pub const VALUATION: &str = "valuation";
    pub const RISK: &str = "risk_manager";
    pub const DECISION: &str = "portfolio_manager";
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Field {
    Text(String),
    Date(NaiveDate),
    Count(u32),
    Flag(bool),
    Portfolio(Portfolio),
    Prices(Vec<PriceBar>),
    Metrics(FinancialMetrics),
    Statements(StatementPair),
    InsiderTrades(Vec<InsiderTrade>),
    Market(MarketSnapshot),
    Gaps(Vec<String>),
    Signal(AgentSignal),
    Risk(RiskAssessment),
    Decision(Decision),
}

impl Field {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Field::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&NaiveDate> {
        match self {
            Field::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<&u32> {
        match self {
            Field::Count(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<&bool> {
        match self {
            Field::Flag(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_portfolio(&self) -> Option<&Portfolio> {
        match self {
            Field::Portfolio(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_prices(&self) -> Option<&[PriceBar]> {
        match self {
            Field::Prices(bars) => Some(bars),
            _ => None,
        }
    }

    pub fn as_metrics(&self) -> Option<&FinancialMetrics> {
        match self {
            Field::Metrics(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_statements(&self) -> Option<&StatementPair> {
        match self {
            Field::Statements(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_insider_trades(&self) -> Option<&[InsiderTrade]> {
        match self {
            Field::InsiderTrades(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_market(&self) -> Option<&MarketSnapshot> {
        match self {
            Field::Market(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_gaps(&self) -> Option<&[String]> {
        match self {
            Field::Gaps(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_signal(&self) -> Option<&AgentSignal> {
        match self {
            Field::Signal(s) => Some(s),
            Field::Risk(r) => Some(&r.signal),
            _ => None,
        }
    }

    pub fn as_risk(&self) -> Option<&RiskAssessment> {
        match self {
            Field::Risk(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_decision(&self) -> Option<&Decision> {
        match self {
            Field::Decision(d) => Some(d),
            _ => None,
        }
    }
}

/// Read `key` from the record through one of the `Field::as_*` accessors.
pub fn require<'a, T: ?Sized>(
    record: &'a Record<Field>,
    key: &str,
    pick: impl Fn(&'a Field) -> Option<&'a T>,
) -> Result<&'a T, StageError> {
    record
        .get(key)
        .and_then(pick)
        .ok_or_else(|| StageError::MissingInput(key.to_string()))
}

/// Data kinds that fell back during this run.
pub fn data_gaps(record: &Record<Field>) -> &[String] {
    record
        .get(keys::DATA_GAPS)
        .and_then(Field::as_gaps)
        .unwrap_or(&[])
}

pub fn has_gap(record: &Record<Field>, kind: &str) -> bool {
    data_gaps(record).iter().any(|g| g == kind)
}
