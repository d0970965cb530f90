//! Trend, mean reversion and momentum over the price history.

use hedgeflow_core::domain::{PriceBar, SignalLabel};
use hedgeflow_core::graph::{Record, Stage, StageError};
use hedgeflow_core::indicators;

use super::{report, unavailable, Vote};
use crate::decision::AgentSignal;
use crate::field::{keys, require, Field};

pub const FAST_SMA: usize = 20;
pub const SLOW_SMA: usize = 50;
pub const RSI_PERIOD: usize = 14;
pub const MOMENTUM_PERIOD: usize = 60;
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;
const MOMENTUM_THRESHOLD: f64 = 0.05;

pub struct TechnicalsStage;

/// Price above both moving averages is bullish, below both bearish.
fn trend(closes: &[f64]) -> Option<(SignalLabel, f64, f64)> {
    let price = *closes.last()?;
    let fast = indicators::sma_last(closes, FAST_SMA)?;
    let slow = indicators::sma_last(closes, SLOW_SMA)?;
    let label = if price > fast && price > slow {
        SignalLabel::Bullish
    } else if price < fast && price < slow {
        SignalLabel::Bearish
    } else {
        SignalLabel::Neutral
    };
    Some((label, fast, slow))
}

fn mean_reversion(closes: &[f64]) -> Option<(SignalLabel, f64)> {
    let rsi = indicators::rsi_last(closes, RSI_PERIOD)?;
    let label = if rsi < RSI_OVERSOLD {
        SignalLabel::Bullish
    } else if rsi > RSI_OVERBOUGHT {
        SignalLabel::Bearish
    } else {
        SignalLabel::Neutral
    };
    Some((label, rsi))
}

fn momentum(closes: &[f64]) -> Option<(SignalLabel, f64)> {
    let roc = indicators::rate_of_change(closes, MOMENTUM_PERIOD)?;
    let label = if roc > MOMENTUM_THRESHOLD {
        SignalLabel::Bullish
    } else if roc < -MOMENTUM_THRESHOLD {
        SignalLabel::Bearish
    } else {
        SignalLabel::Neutral
    };
    Some((label, roc))
}

pub fn analyze(prices: &[PriceBar]) -> AgentSignal {
    const AGENT: &str = keys::TECHNICALS;
    let closes = indicators::closes(prices);

    let mut labels = Vec::new();
    let mut lines = Vec::new();
    let mut metrics = Vec::new();

    match trend(&closes) {
        Some((label, fast, slow)) => {
            labels.push(label);
            lines.push(format!("Trend: {label} (SMA{FAST_SMA} {fast:.2}, SMA{SLOW_SMA} {slow:.2})"));
            metrics.push(("sma_fast", fast));
            metrics.push(("sma_slow", slow));
        }
        None => lines.push(format!("Trend: need {SLOW_SMA} bars, have {}", closes.len())),
    }
    match mean_reversion(&closes) {
        Some((label, rsi)) => {
            labels.push(label);
            lines.push(format!("Mean reversion: {label} (RSI{RSI_PERIOD} {rsi:.1})"));
            metrics.push(("rsi", rsi));
        }
        None => lines.push(format!("Mean reversion: need {} bars", RSI_PERIOD + 1)),
    }
    match momentum(&closes) {
        Some((label, roc)) => {
            labels.push(label);
            lines.push(format!("Momentum: {label} ({MOMENTUM_PERIOD}-bar change {:.1}%)", roc * 100.0));
            metrics.push(("rate_of_change", roc));
        }
        None => lines.push(format!("Momentum: need {} bars", MOMENTUM_PERIOD + 1)),
    }

    if labels.is_empty() {
        return AgentSignal::new(
            AGENT,
            SignalLabel::Neutral,
            0.0,
            format!("Insufficient price history ({} bars). {}", closes.len(), lines.join("; ")),
        );
    }

    let vote = Vote::count(&labels);
    metrics.into_iter().fold(
        AgentSignal::new(AGENT, vote.label(), vote.confidence(), lines.join("\n")),
        |s, (name, value)| s.with_metric(name, value),
    )
}

impl Stage<Field> for TechnicalsStage {
    fn name(&self) -> &str {
        keys::TECHNICALS
    }

    fn run(&self, input: &Record<Field>) -> Result<Record<Field>, StageError> {
        let prices = require(input, keys::PRICES, Field::as_prices)?;
        let signal = analyze(prices);
        report(input, &signal);
        Ok(Record::new().with(keys::TECHNICALS, Field::Signal(signal)))
    }

    fn fallback(&self, _input: &Record<Field>, error: &StageError) -> Record<Field> {
        unavailable(keys::TECHNICALS, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::fixtures::{bars, trending};

    #[test]
    fn steady_uptrend_is_bullish() {
        // RSI pins at 100 on a monotone rise, so mean reversion dissents.
        let s = analyze(&trending(120, 100.0, 1.0));
        assert_eq!(s.signal, SignalLabel::Bullish);
        assert!((s.confidence - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(s.metrics.get("rsi"), Some(&100.0));
    }

    #[test]
    fn steady_downtrend_is_bearish() {
        let s = analyze(&trending(120, 300.0, -1.0));
        assert_eq!(s.signal, SignalLabel::Bearish);
    }

    #[test]
    fn short_history_is_neutral_with_zero_confidence() {
        let s = analyze(&bars(&[10.0, 11.0, 12.0]));
        assert_eq!(s.signal, SignalLabel::Neutral);
        assert_eq!(s.confidence, 0.0);
        assert!(s.reasoning.contains("3 bars"));
    }

    #[test]
    fn stage_reads_prices_from_record() {
        let record = Record::new().with(keys::PRICES, Field::Prices(trending(120, 100.0, 1.0)));
        let out = TechnicalsStage.run(&record).unwrap();
        let signal = out.get(keys::TECHNICALS).and_then(Field::as_signal).unwrap();
        assert_eq!(signal.agent, "technicals");
    }

    #[test]
    fn fallback_is_neutral() {
        let out = TechnicalsStage.fallback(&Record::new(), &StageError::MissingInput("prices".into()));
        let signal = out.get(keys::TECHNICALS).and_then(Field::as_signal).unwrap();
        assert_eq!(signal.signal, SignalLabel::Neutral);
        assert_eq!(signal.confidence, 0.0);
    }
}
