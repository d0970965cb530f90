//! Run requests and their validation.
//!
//! A request is validated in full before any stage runs. Every rejection is a
//! `RequestError`; nothing downstream re-checks these bounds.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_LOOKBACK_DAYS: i64 = 90;
pub const MAX_RANGE_DAYS: i64 = 365;
pub const MIN_NEWS: u32 = 1;
pub const MAX_NEWS: u32 = 100;
pub const DEFAULT_NUM_OF_NEWS: u32 = 5;
pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("subject must not be empty")]
    EmptySubject,

    #[error("subject '{0}' contains no letters or digits")]
    InvalidSubject(String),

    #[error("{field} '{value}' is not a YYYY-MM-DD date")]
    MalformedDate { field: &'static str, value: String },

    #[error("start date {start} is after end date {end}")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },

    #[error("end date {end} is in the future (today is {today})")]
    FutureEndDate { end: NaiveDate, today: NaiveDate },

    #[error("date range spans {days} days; at most {max} allowed")]
    RangeTooLong { days: i64, max: i64 },

    #[error("number of news articles must be between 1 and 100, got {0}")]
    NewsCountOutOfRange(u32),

    #[error("portfolio {field} must be non-negative, got {value}")]
    NegativePortfolio { field: &'static str, value: f64 },
}

/// Holdings the decision is sized against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    /// Shares currently held.
    pub stock: f64,
}

impl Default for Portfolio {
    fn default() -> Self {
        Self {
            cash: DEFAULT_INITIAL_CAPITAL,
            stock: 0.0,
        }
    }
}

/// An unvalidated request, as received from a caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub subject: String,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub portfolio: Portfolio,
    #[serde(default)]
    pub show_reasoning: bool,
    #[serde(default = "default_num_of_news")]
    pub num_of_news: u32,
}

fn default_num_of_news() -> u32 {
    DEFAULT_NUM_OF_NEWS
}

impl RunRequest {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            start_date: None,
            end_date: None,
            portfolio: Portfolio::default(),
            show_reasoning: false,
            num_of_news: DEFAULT_NUM_OF_NEWS,
        }
    }

    pub fn with_dates(mut self, start: Option<&str>, end: Option<&str>) -> Self {
        self.start_date = start.map(str::to_string);
        self.end_date = end.map(str::to_string);
        self
    }

    /// Resolve defaults and check every bound against `today`.
    ///
    /// Defaults: end = today, start = end minus 90 days.
    pub fn validate(&self, today: NaiveDate) -> Result<ValidatedRequest, RequestError> {
        let subject = self.subject.trim().to_uppercase();
        if subject.is_empty() {
            return Err(RequestError::EmptySubject);
        }
        if !subject.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(RequestError::InvalidSubject(subject));
        }

        let end = match &self.end_date {
            Some(raw) => parse_date("end_date", raw)?,
            None => today,
        };
        let start = match &self.start_date {
            Some(raw) => parse_date("start_date", raw)?,
            None => end - Duration::days(DEFAULT_LOOKBACK_DAYS),
        };

        if start > end {
            return Err(RequestError::StartAfterEnd { start, end });
        }
        if end > today {
            return Err(RequestError::FutureEndDate { end, today });
        }
        let days = (end - start).num_days();
        if days > MAX_RANGE_DAYS {
            return Err(RequestError::RangeTooLong {
                days,
                max: MAX_RANGE_DAYS,
            });
        }

        if !(MIN_NEWS..=MAX_NEWS).contains(&self.num_of_news) {
            return Err(RequestError::NewsCountOutOfRange(self.num_of_news));
        }

        // NaN fails both comparisons, so test for the valid range.
        for (field, value) in [("cash", self.portfolio.cash), ("stock", self.portfolio.stock)] {
            if !(value >= 0.0) {
                return Err(RequestError::NegativePortfolio { field, value });
            }
        }

        Ok(ValidatedRequest {
            subject,
            start,
            end,
            portfolio: self.portfolio,
            show_reasoning: self.show_reasoning,
            num_of_news: self.num_of_news,
        })
    }
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, RequestError> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).map_err(|_| RequestError::MalformedDate {
        field,
        value: raw.to_string(),
    })
}

/// A request with defaults resolved and every bound checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedRequest {
    pub subject: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub portfolio: Portfolio,
    pub show_reasoning: bool,
    pub num_of_news: u32,
}

impl ValidatedRequest {
    /// Deterministic fingerprint of the resolved request.
    ///
    /// Same subject, dates, portfolio and parameters give the same id.
    pub fn run_id(&self) -> String {
        let canonical = match serde_json::to_string(self) {
            Ok(json) => json,
            Err(_) => format!("{self:?}"),
        };
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }
}
