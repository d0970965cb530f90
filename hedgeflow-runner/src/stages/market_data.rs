//! Entry stage: gathers every record the analysts need.

use std::sync::Arc;

use chrono::Duration;
use tracing::{info, warn};

use hedgeflow_core::data::Fetched;
use hedgeflow_core::domain::{MarketSnapshot, RecordKind, StatementPair};
use hedgeflow_core::graph::{Record, Stage, StageError};

use crate::context::PipelineContext;
use crate::field::{keys, require, Field};

/// Technical analysis needs at least this much history, whatever the
/// requested window.
pub const MIN_HISTORY_DAYS: i64 = 365;

pub struct MarketDataStage {
    ctx: Arc<PipelineContext>,
}

impl MarketDataStage {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }
}

fn note_gap<T>(gaps: &mut Vec<String>, kind: RecordKind, fetched: &Fetched<T>) {
    if fetched.is_degraded() {
        gaps.push(kind.as_str().to_string());
    }
}

impl Stage<Field> for MarketDataStage {
    fn name(&self) -> &str {
        "market_data"
    }

    fn run(&self, input: &Record<Field>) -> Result<Record<Field>, StageError> {
        let subject = require(input, keys::SUBJECT, Field::as_text)?;
        let start = *require(input, keys::START_DATE, Field::as_date)?;
        let end = *require(input, keys::END_DATE, Field::as_date)?;
        let fetch_start = start.min(end - Duration::days(MIN_HISTORY_DAYS));

        info!(subject, %start, %fetch_start, %end, "gathering market data");

        let data = &self.ctx.data;
        let ((prices, metrics), (statements, (insider, market))) = rayon::join(
            || {
                rayon::join(
                    || data.price_history(subject, fetch_start, end),
                    || data.financial_metrics(subject),
                )
            },
            || {
                rayon::join(
                    || data.financial_statements(subject),
                    || rayon::join(|| data.insider_trades(subject), || data.market_data(subject)),
                )
            },
        );

        let mut gaps = Vec::new();
        note_gap(&mut gaps, RecordKind::PriceHistory, &prices);
        note_gap(&mut gaps, RecordKind::FinancialMetrics, &metrics);
        note_gap(&mut gaps, RecordKind::FinancialStatements, &statements);
        note_gap(&mut gaps, RecordKind::InsiderTrades, &insider);
        note_gap(&mut gaps, RecordKind::MarketData, &market);
        if !gaps.is_empty() {
            warn!(subject, gaps = ?gaps, "continuing with degraded market data");
        }

        info!(
            subject,
            bars = prices.value.len(),
            insider_trades = insider.value.len(),
            "market data gathered"
        );

        Ok(Record::new()
            .with(keys::START_DATE, Field::Date(fetch_start))
            .with(keys::PRICES, Field::Prices(prices.value))
            .with(keys::FINANCIAL_METRICS, Field::Metrics(metrics.value))
            .with(keys::STATEMENTS, Field::Statements(statements.value))
            .with(keys::INSIDER_TRADES, Field::InsiderTrades(insider.value))
            .with(keys::MARKET, Field::Market(market.value))
            .with(keys::DATA_GAPS, Field::Gaps(gaps)))
    }

    /// Every record in its degraded shape, each listed as a gap.
    fn fallback(&self, _input: &Record<Field>, error: &StageError) -> Record<Field> {
        warn!(error = %error, "market data stage failed; analysts will see empty records");
        let gaps = [
            RecordKind::PriceHistory,
            RecordKind::FinancialMetrics,
            RecordKind::FinancialStatements,
            RecordKind::InsiderTrades,
            RecordKind::MarketData,
        ]
        .iter()
        .map(|k| k.as_str().to_string())
        .collect();
        Record::new()
            .with(keys::PRICES, Field::Prices(Vec::new()))
            .with(keys::FINANCIAL_METRICS, Field::Metrics(Default::default()))
            .with(keys::STATEMENTS, Field::Statements(StatementPair::default()))
            .with(keys::INSIDER_TRADES, Field::InsiderTrades(Vec::new()))
            .with(keys::MARKET, Field::Market(MarketSnapshot::default()))
            .with(keys::DATA_GAPS, Field::Gaps(gaps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::fixtures::{date, offline_context};

    fn seed() -> Record<Field> {
        Record::new()
            .with(keys::SUBJECT, Field::Text("AAPL".into()))
            .with(keys::START_DATE, Field::Date(date(2024, 8, 17)))
            .with(keys::END_DATE, Field::Date(date(2024, 11, 15)))
    }

    #[test]
    fn window_extends_to_a_year_and_outage_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        let stage = MarketDataStage::new(offline_context(dir.path()));

        let out = stage.run(&seed()).unwrap();

        assert_eq!(
            out.get(keys::START_DATE).and_then(Field::as_date),
            Some(&date(2023, 11, 16))
        );
        assert_eq!(out.get(keys::PRICES).and_then(Field::as_prices), Some(&[][..]));
        let gaps = out.get(keys::DATA_GAPS).and_then(Field::as_gaps).unwrap();
        assert_eq!(
            gaps,
            [
                "price_history",
                "financial_metrics",
                "financial_statements",
                "insider_trades",
                "market_data"
            ]
        );
    }

    #[test]
    fn missing_subject_is_a_stage_error() {
        let dir = tempfile::tempdir().unwrap();
        let stage = MarketDataStage::new(offline_context(dir.path()));
        let err = stage.run(&Record::new()).unwrap_err();
        assert!(matches!(err, StageError::MissingInput(ref k) if k == keys::SUBJECT));

        let degraded = stage.fallback(&Record::new(), &err);
        assert_eq!(
            degraded.get(keys::STATEMENTS).and_then(Field::as_statements),
            Some(&StatementPair::default())
        );
        assert_eq!(degraded.get(keys::DATA_GAPS).and_then(Field::as_gaps).map(<[_]>::len), Some(5));
    }
}
