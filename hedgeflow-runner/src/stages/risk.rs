//! Risk score, position limits and the consolidated analyst view.

use hedgeflow_core::domain::{PriceBar, SignalLabel};
use hedgeflow_core::graph::{Record, Stage, StageError};
use hedgeflow_core::indicators;

use super::{report, Vote};
use crate::decision::{AgentSignal, RiskAssessment, TradeAction};
use crate::field::{keys, require, Field};
use crate::request::Portfolio;

/// Share of total portfolio value a single position may take.
pub const MAX_POSITION_FRACTION: f64 = 0.25;
/// From this score on the position limit is halved.
pub const HIGH_RISK: u8 = 7;
/// From this score on the only allowed action is hold.
pub const HALT_RISK: u8 = 9;
const MAX_RISK: u8 = 10;

const ANALYSTS: [&str; 4] = [
    keys::TECHNICALS,
    keys::FUNDAMENTALS,
    keys::SENTIMENT,
    keys::VALUATION,
];

pub struct RiskManagerStage;

/// Historical 95% value at risk: the 5th percentile of daily returns.
pub fn value_at_risk_95(closes: &[f64]) -> Option<f64> {
    let mut returns = indicators::daily_returns(closes);
    if returns.is_empty() {
        return None;
    }
    returns.sort_by(f64::total_cmp);
    let idx = ((returns.len() as f64 * 0.05).ceil() as usize).saturating_sub(1);
    returns.get(idx).copied()
}

fn band(value: f64, high: f64, elevated: f64) -> u8 {
    if value > high {
        2
    } else if value > elevated {
        1
    } else {
        0
    }
}

/// Points from market behaviour plus analyst disagreement, capped at 10.
pub fn risk_score(volatility: f64, var_95: f64, drawdown: f64, labels: &[SignalLabel]) -> u8 {
    let vote = Vote::count(labels);
    let mut score = band(volatility, 0.30, 0.20) + band(-var_95, 0.03, 0.02) + band(-drawdown, 0.20, 0.10);
    score += match vote.bearish {
        n if n >= 3 => 2,
        2 => 1,
        _ => 0,
    };
    if vote.bullish > 0 && vote.bearish > 0 {
        score += 1;
    }
    score.min(MAX_RISK)
}

pub fn total_value(portfolio: &Portfolio, price: f64) -> f64 {
    portfolio.cash + portfolio.stock * price
}

pub fn max_position_size(portfolio: &Portfolio, price: f64, risk_score: u8) -> f64 {
    let limit = total_value(portfolio, price) * MAX_POSITION_FRACTION;
    if risk_score >= HIGH_RISK {
        limit / 2.0
    } else {
        limit
    }
}

pub fn assess(prices: &[PriceBar], portfolio: &Portfolio, signals: &[&AgentSignal]) -> RiskAssessment {
    let closes = indicators::closes(prices);
    let labels: Vec<SignalLabel> = signals.iter().map(|s| s.signal).collect();
    let vote = Vote::count(&labels);
    let last_price = closes.last().copied().filter(|p| p.is_finite()).unwrap_or(0.0);

    let views: Vec<String> = signals
        .iter()
        .map(|s| format!("{}: {} ({})", s.agent, s.signal, s.confidence_pct()))
        .collect();

    let (volatility, var_95) = match (
        indicators::annualized_volatility(&closes),
        value_at_risk_95(&closes),
    ) {
        (Some(vol), Some(var)) => (vol, var),
        _ => {
            let reasoning = format!(
                "Insufficient price history ({} bars); risk cannot be measured\n{}",
                closes.len(),
                views.join("\n")
            );
            return RiskAssessment {
                signal: AgentSignal::new(keys::RISK, SignalLabel::Neutral, 0.0, reasoning),
                risk_score: MAX_RISK,
                max_position_size: max_position_size(portfolio, last_price, MAX_RISK),
                trading_action: TradeAction::Hold,
                annualized_volatility: 0.0,
                value_at_risk_95: 0.0,
                max_drawdown: 0.0,
            };
        }
    };
    let drawdown = indicators::max_drawdown(&closes);
    let score = risk_score(volatility, var_95, drawdown, &labels);
    let max_position = max_position_size(portfolio, last_price, score);
    let trading_action = if score >= HALT_RISK {
        TradeAction::Hold
    } else {
        TradeAction::from_signal(vote.label())
    };

    let mut lines = vec![format!(
        "Risk score {score}/10: volatility {:.1}%, VaR(95) {:.2}%, max drawdown {:.1}%",
        volatility * 100.0,
        var_95 * 100.0,
        drawdown * 100.0
    )];
    lines.push(format!(
        "Max position ${max_position:.2} of ${:.2} portfolio value",
        total_value(portfolio, last_price)
    ));
    if score >= HALT_RISK {
        lines.push("Risk too high; trading halted".to_string());
    }
    lines.extend(views);

    let signal = AgentSignal::new(keys::RISK, vote.label(), vote.confidence(), lines.join("\n"))
        .with_metric("risk_score", f64::from(score))
        .with_metric("max_position_size", max_position);

    RiskAssessment {
        signal,
        risk_score: score,
        max_position_size: max_position,
        trading_action,
        annualized_volatility: volatility,
        value_at_risk_95: var_95,
        max_drawdown: drawdown,
    }
}

impl Stage<Field> for RiskManagerStage {
    fn name(&self) -> &str {
        keys::RISK
    }

    fn run(&self, input: &Record<Field>) -> Result<Record<Field>, StageError> {
        let prices = require(input, keys::PRICES, Field::as_prices)?;
        let portfolio = require(input, keys::PORTFOLIO, Field::as_portfolio)?;
        let signals = ANALYSTS
            .iter()
            .map(|key| require(input, key, Field::as_signal))
            .collect::<Result<Vec<_>, _>>()?;

        let assessment = assess(prices, portfolio, &signals);
        report(input, &assessment.signal);
        Ok(Record::new().with(keys::RISK, Field::Risk(assessment)))
    }

    /// No trading when risk cannot be assessed.
    fn fallback(&self, _input: &Record<Field>, error: &StageError) -> Record<Field> {
        let assessment = RiskAssessment {
            signal: AgentSignal::unavailable(keys::RISK, error),
            risk_score: MAX_RISK,
            max_position_size: 0.0,
            trading_action: TradeAction::Hold,
            annualized_volatility: 0.0,
            value_at_risk_95: 0.0,
            max_drawdown: 0.0,
        };
        Record::new().with(keys::RISK, Field::Risk(assessment))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::fixtures::{bars, trending};
    use SignalLabel::*;

    fn signal(agent: &str, label: SignalLabel) -> AgentSignal {
        AgentSignal::new(agent, label, 0.8, "")
    }

    fn portfolio() -> Portfolio {
        Portfolio {
            cash: 100_000.0,
            stock: 0.0,
        }
    }

    #[test]
    fn calm_uptrend_with_agreeing_analysts_is_low_risk() {
        let signals = [
            signal(keys::TECHNICALS, Bullish),
            signal(keys::FUNDAMENTALS, Bullish),
            signal(keys::SENTIMENT, Neutral),
            signal(keys::VALUATION, Bullish),
        ];
        let refs: Vec<&AgentSignal> = signals.iter().collect();
        let r = assess(&trending(120, 100.0, 0.1), &portfolio(), &refs);
        assert_eq!(r.risk_score, 0);
        assert_eq!(r.max_position_size, 25_000.0);
        assert_eq!(r.trading_action, TradeAction::Buy);
        assert_eq!(r.signal.agent, "risk_manager");
        assert_eq!(r.max_drawdown, 0.0);
    }

    #[test]
    fn score_bands_and_cap() {
        assert_eq!(risk_score(0.1, -0.01, -0.05, &[]), 0);
        assert_eq!(risk_score(0.25, -0.025, -0.15, &[]), 3);
        // 2 + 2 + 2, then 2 for three bearish and 1 for the conflict.
        let labels = [Bearish, Bearish, Bearish, Bullish];
        assert_eq!(risk_score(0.5, -0.1, -0.5, &labels), 9);
        let labels = [Bearish, Bearish, Bearish, Bearish];
        assert_eq!(risk_score(0.5, -0.1, -0.5, &labels), 8);
    }

    #[test]
    fn high_risk_halves_position_and_halts_trading() {
        // Alternating +-10% swings with a long slide.
        let closes: Vec<f64> = (0..60)
            .map(|i| 100.0 * 0.99f64.powi(i) * if i % 2 == 0 { 1.0 } else { 0.9 })
            .collect();
        let signals = [
            signal(keys::TECHNICALS, Bearish),
            signal(keys::FUNDAMENTALS, Bearish),
            signal(keys::SENTIMENT, Bearish),
            signal(keys::VALUATION, Bullish),
        ];
        let refs: Vec<&AgentSignal> = signals.iter().collect();
        let r = assess(&bars(&closes), &portfolio(), &refs);
        assert!(r.risk_score >= HALT_RISK);
        assert_eq!(r.trading_action, TradeAction::Hold);
        assert_eq!(r.max_position_size, 12_500.0);
    }

    #[test]
    fn short_history_is_maximum_risk() {
        let r = assess(&bars(&[100.0]), &portfolio(), &[]);
        assert_eq!(r.risk_score, 10);
        assert_eq!(r.trading_action, TradeAction::Hold);
    }

    #[test]
    fn value_at_risk_picks_fifth_percentile() {
        let mut closes = vec![100.0];
        for i in 0..20 {
            let r = if i == 0 { -0.10 } else { 0.01 };
            let last = *closes.last().unwrap();
            closes.push(last * (1.0 + r));
        }
        let var = value_at_risk_95(&closes).unwrap();
        assert!((var + 0.10).abs() < 1e-9);
    }

    #[test]
    fn missing_analyst_falls_back_to_hold() {
        let record = Record::new()
            .with(keys::PRICES, Field::Prices(trending(10, 100.0, 1.0)))
            .with(keys::PORTFOLIO, Field::Portfolio(portfolio()));
        let err = RiskManagerStage.run(&record).unwrap_err();
        assert!(matches!(&err, StageError::MissingInput(k) if k == keys::TECHNICALS));
        let out = RiskManagerStage.fallback(&record, &err);
        let risk = out.get(keys::RISK).and_then(Field::as_risk).unwrap();
        assert_eq!(risk.trading_action, TradeAction::Hold);
        assert_eq!(risk.risk_score, 10);
    }
}
