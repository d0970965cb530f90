//! Profitability, growth, financial health and price ratios.

use hedgeflow_core::domain::{FinancialMetrics, RecordKind, SignalLabel};
use hedgeflow_core::graph::{Record, Stage, StageError};

use super::{report, unavailable, Vote};
use crate::decision::AgentSignal;
use crate::field::{has_gap, keys, require, Field};

pub struct FundamentalsStage;

/// One category of checks.
struct Category {
    name: &'static str,
    passed: usize,
    detail: String,
}

impl Category {
    fn new(name: &'static str, checks: &[bool], detail: String) -> Self {
        Self {
            name,
            passed: checks.iter().filter(|c| **c).count(),
            detail,
        }
    }

    /// Bullish with two or more passing checks, bearish with none.
    fn label(&self) -> SignalLabel {
        match self.passed {
            0 => SignalLabel::Bearish,
            1 => SignalLabel::Neutral,
            _ => SignalLabel::Bullish,
        }
    }
}

fn pct(v: f64) -> String {
    format!("{:.1}%", v * 100.0)
}

/// A ratio only counts when it is positive; zero means "not reported".
fn cheap(ratio: f64, limit: f64) -> bool {
    ratio > 0.0 && ratio < limit
}

pub fn analyze(m: &FinancialMetrics) -> AgentSignal {
    let categories = [
        Category::new(
            "Profitability",
            &[
                m.return_on_equity > 0.15,
                m.net_margin > 0.20,
                m.operating_margin > 0.15,
            ],
            format!(
                "ROE {}, net margin {}, operating margin {}",
                pct(m.return_on_equity),
                pct(m.net_margin),
                pct(m.operating_margin)
            ),
        ),
        Category::new(
            "Growth",
            &[m.revenue_growth > 0.10, m.earnings_growth > 0.10],
            format!(
                "revenue growth {}, earnings growth {}",
                pct(m.revenue_growth),
                pct(m.earnings_growth)
            ),
        ),
        Category::new(
            "Financial health",
            &[m.current_ratio > 1.5, m.debt_to_equity < 0.5],
            format!(
                "current ratio {:.2}, debt/equity {:.2}",
                m.current_ratio, m.debt_to_equity
            ),
        ),
        Category::new(
            "Price ratios",
            &[
                cheap(m.price_to_earnings_ratio, 25.0),
                cheap(m.price_to_book_ratio, 3.0),
                cheap(m.price_to_sales_ratio, 5.0),
            ],
            format!(
                "P/E {:.2}, P/B {:.2}, P/S {:.2}",
                m.price_to_earnings_ratio, m.price_to_book_ratio, m.price_to_sales_ratio
            ),
        ),
    ];

    let labels: Vec<SignalLabel> = categories.iter().map(Category::label).collect();
    let vote = Vote::count(&labels);
    let mut reasoning: Vec<String> = categories
        .iter()
        .map(|c| format!("{}: {} ({})", c.name, c.label(), c.detail))
        .collect();
    if !m.is_data_recent {
        reasoning.push(match m.days_since_update {
            Some(days) => format!("Latest statements are {days} days old"),
            None => "Statement date unknown".to_string(),
        });
    }

    AgentSignal::new(
        keys::FUNDAMENTALS,
        vote.label(),
        vote.confidence(),
        reasoning.join("\n"),
    )
    .with_metric("return_on_equity", m.return_on_equity)
    .with_metric("revenue_growth", m.revenue_growth)
    .with_metric("current_ratio", m.current_ratio)
    .with_metric("price_to_earnings_ratio", m.price_to_earnings_ratio)
}

impl Stage<Field> for FundamentalsStage {
    fn name(&self) -> &str {
        keys::FUNDAMENTALS
    }

    fn run(&self, input: &Record<Field>) -> Result<Record<Field>, StageError> {
        let metrics = require(input, keys::FINANCIAL_METRICS, Field::as_metrics)?;
        let signal = if has_gap(input, RecordKind::FinancialMetrics.as_str()) {
            AgentSignal::new(
                keys::FUNDAMENTALS,
                SignalLabel::Neutral,
                0.0,
                "Financial metrics unavailable; no fundamental view",
            )
        } else {
            analyze(metrics)
        };
        report(input, &signal);
        Ok(Record::new().with(keys::FUNDAMENTALS, Field::Signal(signal)))
    }

    fn fallback(&self, _input: &Record<Field>, error: &StageError) -> Record<Field> {
        unavailable(keys::FUNDAMENTALS, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strong() -> FinancialMetrics {
        FinancialMetrics {
            return_on_equity: 0.30,
            net_margin: 0.25,
            operating_margin: 0.30,
            revenue_growth: 0.15,
            earnings_growth: 0.20,
            current_ratio: 2.0,
            debt_to_equity: 0.3,
            price_to_earnings_ratio: 18.0,
            price_to_book_ratio: 2.5,
            price_to_sales_ratio: 4.0,
            is_data_recent: true,
            ..Default::default()
        }
    }

    #[test]
    fn strong_company_is_unanimously_bullish() {
        let s = analyze(&strong());
        assert_eq!(s.signal, SignalLabel::Bullish);
        assert_eq!(s.confidence, 1.0);
    }

    #[test]
    fn unreported_ratios_do_not_count_as_cheap() {
        let m = FinancialMetrics {
            price_to_earnings_ratio: 0.0,
            price_to_book_ratio: 0.0,
            price_to_sales_ratio: 0.0,
            ..strong()
        };
        let s = analyze(&m);
        assert!(s.reasoning.contains("Price ratios: bearish"));
        // 3 bullish categories against 1 bearish.
        assert_eq!(s.signal, SignalLabel::Bullish);
        assert!((s.confidence - 0.75).abs() < 1e-12);
    }

    #[test]
    fn stale_statements_are_noted() {
        let m = FinancialMetrics {
            is_data_recent: false,
            days_since_update: Some(140),
            ..strong()
        };
        assert!(analyze(&m).reasoning.contains("140 days old"));
    }

    #[test]
    fn degraded_metrics_give_no_view() {
        let record = Record::new()
            .with(keys::FINANCIAL_METRICS, Field::Metrics(FinancialMetrics::default()))
            .with(keys::DATA_GAPS, Field::Gaps(vec!["financial_metrics".into()]));
        let out = FundamentalsStage.run(&record).unwrap();
        let s = out.get(keys::FUNDAMENTALS).and_then(Field::as_signal).unwrap();
        assert_eq!(s.signal, SignalLabel::Neutral);
        assert_eq!(s.confidence, 0.0);
    }
}
