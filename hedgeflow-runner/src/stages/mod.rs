//! The seven analysis stages of the decision pipeline.
//!
//! ```text
//! market_data ─┬─ technicals ───┐
//!              ├─ fundamentals ─┤
//!              ├─ sentiment ────┼─ risk_manager ── portfolio_manager
//!              └─ valuation ────┘
//! ```
//!
//! Each stage reads a frozen snapshot of the shared record and writes one
//! verdict under its own key. A failing stage writes a neutral,
//! zero-confidence verdict instead.

pub mod fundamentals;
pub mod market_data;
pub mod portfolio;
pub mod risk;
pub mod sentiment;
pub mod technicals;
pub mod valuation;

pub use fundamentals::FundamentalsStage;
pub use market_data::MarketDataStage;
pub use portfolio::PortfolioManagerStage;
pub use risk::RiskManagerStage;
pub use sentiment::SentimentStage;
pub use technicals::TechnicalsStage;
pub use valuation::ValuationStage;

use tracing::{debug, info};

use hedgeflow_core::domain::SignalLabel;
use hedgeflow_core::graph::{Record, StageError};

use crate::decision::AgentSignal;
use crate::field::{keys, Field};

/// Tally of a set of sub-verdicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vote {
    pub bullish: usize,
    pub bearish: usize,
    pub total: usize,
}

impl Vote {
    pub fn count(labels: &[SignalLabel]) -> Self {
        Self {
            bullish: labels.iter().filter(|l| **l == SignalLabel::Bullish).count(),
            bearish: labels.iter().filter(|l| **l == SignalLabel::Bearish).count(),
            total: labels.len(),
        }
    }

    /// Plurality of bullish over bearish; ties are neutral.
    pub fn label(&self) -> SignalLabel {
        use std::cmp::Ordering;
        match self.bullish.cmp(&self.bearish) {
            Ordering::Greater => SignalLabel::Bullish,
            Ordering::Less => SignalLabel::Bearish,
            Ordering::Equal => SignalLabel::Neutral,
        }
    }

    /// Share of sub-verdicts agreeing with the winning label.
    pub fn confidence(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        let agreeing = match self.label() {
            SignalLabel::Bullish => self.bullish,
            SignalLabel::Bearish => self.bearish,
            SignalLabel::Neutral => self.total - self.bullish - self.bearish,
        };
        agreeing as f64 / self.total as f64
    }
}

/// Log a finished verdict: at info level when the run asked to show
/// reasoning, at debug otherwise.
pub(crate) fn report(input: &Record<Field>, signal: &AgentSignal) {
    let show = input
        .get(keys::SHOW_REASONING)
        .and_then(Field::as_flag)
        .copied()
        .unwrap_or(false);
    if show {
        info!(
            stage = %signal.agent,
            signal = %signal.signal,
            confidence = %signal.confidence_pct(),
            "{}",
            signal.reasoning
        );
    } else {
        debug!(stage = %signal.agent, signal = %signal.signal, confidence = signal.confidence);
    }
}

/// Degraded output shared by the analyst stages.
pub(crate) fn unavailable(key: &str, error: &StageError) -> Record<Field> {
    Record::new().with(key, Field::Signal(AgentSignal::unavailable(key, error)))
}


#[cfg(test)]
mod tests {
    use super::*;
    use SignalLabel::*;

    #[test]
    fn plurality_vote() {
        let v = Vote::count(&[Bullish, Bullish, Bearish, Neutral]);
        assert_eq!(v.label(), Bullish);
        assert!((v.confidence() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn tie_is_neutral() {
        let v = Vote::count(&[Bullish, Bearish, Neutral]);
        assert_eq!(v.label(), Neutral);
        assert!((v.confidence() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn empty_vote_has_no_confidence() {
        assert_eq!(Vote::count(&[]).confidence(), 0.0);
    }
}
