//! Terminal stage: weighs the analyst verdicts into one sized order.

use std::sync::Arc;

use tracing::{debug, info, warn};

use hedgeflow_core::domain::SignalLabel;
use hedgeflow_core::graph::{Record, Stage, StageError};

use super::risk::HALT_RISK;
use crate::context::PipelineContext;
use crate::decision::{AgentSignal, Decision, RiskAssessment, TradeAction};
use crate::field::{data_gaps, keys, require, Field};
use crate::llm::ChatMessage;
use crate::request::Portfolio;

/// Analyst weights in the final vote. They sum to one.
pub const WEIGHTS: [(&str, f64); 4] = [
    (keys::VALUATION, 0.35),
    (keys::FUNDAMENTALS, 0.30),
    (keys::TECHNICALS, 0.25),
    (keys::SENTIMENT, 0.10),
];
/// A weighted score beyond this is a trade.
pub const ACTION_THRESHOLD: f64 = 0.1;

const SYSTEM_PROMPT: &str = "You are a portfolio manager. Given analyst signals, a risk \
    assessment and a proposed order, explain the order in at most four sentences. Do not \
    change the order.";

pub struct PortfolioManagerStage {
    ctx: Arc<PipelineContext>,
}

impl PortfolioManagerStage {
    pub fn new(ctx: Arc<PipelineContext>) -> Self {
        Self { ctx }
    }

    /// Model-written rationale, or `None` when there is no model or it fails.
    fn narrate(&self, subject: &str, draft: &str) -> Option<String> {
        let model = self.ctx.chat_model()?;
        let messages = [
            ChatMessage::system(SYSTEM_PROMPT),
            ChatMessage::user(format!("Subject: {subject}\n\n{draft}")),
        ];
        match model.complete(&messages) {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Ok(_) => {
                warn!(subject, model = model.name(), "empty rationale, using deterministic one");
                None
            }
            Err(e) => {
                warn!(subject, model = model.name(), error = %e, "rationale request failed");
                None
            }
        }
    }
}

/// Sum of weight * direction * confidence over the weighted analysts.
pub fn weighted_score(signals: &[&AgentSignal]) -> f64 {
    WEIGHTS
        .iter()
        .filter_map(|(agent, weight)| {
            signals
                .iter()
                .find(|s| s.agent == *agent)
                .map(|s| weight * s.signal.direction() * s.confidence)
        })
        .sum()
}

pub fn action_for(score: f64) -> TradeAction {
    if score > ACTION_THRESHOLD {
        TradeAction::Buy
    } else if score < -ACTION_THRESHOLD {
        TradeAction::Sell
    } else {
        TradeAction::Hold
    }
}

/// Shares to trade. Buys are bounded by cash and the risk position limit,
/// sells by the shares held.
pub fn order_quantity(action: TradeAction, portfolio: &Portfolio, max_position: f64, price: f64) -> u64 {
    match action {
        TradeAction::Buy if price > 0.0 => {
            let budget = portfolio.cash.min(max_position).max(0.0);
            (budget / price).floor() as u64
        }
        TradeAction::Sell => portfolio.stock.max(0.0).floor() as u64,
        _ => 0,
    }
}

/// Weighted confidence of the analysts that agree with `action`.
fn agreement(action: TradeAction, signals: &[&AgentSignal]) -> f64 {
    let agreeing = match action {
        TradeAction::Buy => SignalLabel::Bullish,
        TradeAction::Sell => SignalLabel::Bearish,
        TradeAction::Hold => SignalLabel::Neutral,
    };
    WEIGHTS
        .iter()
        .filter_map(|(agent, weight)| {
            signals
                .iter()
                .find(|s| s.agent == *agent && s.signal == agreeing)
                .map(|s| weight * s.confidence)
        })
        .sum()
}

pub struct Inputs<'a> {
    pub run_id: &'a str,
    pub subject: &'a str,
    pub price: f64,
    pub portfolio: &'a Portfolio,
    pub signals: Vec<&'a AgentSignal>,
    pub risk: &'a RiskAssessment,
    pub data_gaps: &'a [String],
}

/// The order and its deterministic rationale.
pub fn decide(inputs: &Inputs<'_>) -> Decision {
    let score = weighted_score(&inputs.signals);
    let mut action = action_for(score);
    let mut notes = Vec::new();

    if action != TradeAction::Hold && inputs.risk.risk_score >= HALT_RISK {
        notes.push(format!(
            "Risk score {} blocks a {action}; holding",
            inputs.risk.risk_score
        ));
        action = TradeAction::Hold;
    }

    let mut quantity = order_quantity(action, inputs.portfolio, inputs.risk.max_position_size, inputs.price);
    if action != TradeAction::Hold && quantity == 0 {
        notes.push(match action {
            TradeAction::Sell => "No shares held to sell; holding".to_string(),
            _ => format!(
                "Position limit ${:.2} buys no shares at ${:.2}; holding",
                inputs.risk.max_position_size.min(inputs.portfolio.cash),
                inputs.price
            ),
        });
        action = TradeAction::Hold;
        quantity = 0;
    }

    let mut lines: Vec<String> = inputs
        .signals
        .iter()
        .map(|s| format!("{}: {} ({})", s.agent, s.signal, s.confidence_pct()))
        .collect();
    lines.push(format!(
        "Risk score {}/10, max position ${:.2}",
        inputs.risk.risk_score, inputs.risk.max_position_size
    ));
    lines.push(format!("Weighted score {score:.3}: {action} {quantity} shares"));
    lines.extend(notes);
    if !inputs.data_gaps.is_empty() {
        lines.push(format!("Data gaps: {}", inputs.data_gaps.join(", ")));
    }

    let mut agent_signals: Vec<AgentSignal> = inputs.signals.iter().map(|s| (*s).clone()).collect();
    agent_signals.push(inputs.risk.signal.clone());

    Decision {
        run_id: inputs.run_id.to_string(),
        subject: inputs.subject.to_string(),
        action,
        quantity,
        confidence: agreement(action, &inputs.signals).clamp(0.0, 1.0),
        agent_signals,
        reasoning: lines.join("\n"),
        data_gaps: inputs.data_gaps.to_vec(),
        degraded_stages: Vec::new(),
    }
}

impl Stage<Field> for PortfolioManagerStage {
    fn name(&self) -> &str {
        keys::DECISION
    }

    fn run(&self, input: &Record<Field>) -> Result<Record<Field>, StageError> {
        let run_id = require(input, keys::RUN_ID, Field::as_text)?;
        let subject = require(input, keys::SUBJECT, Field::as_text)?;
        let prices = require(input, keys::PRICES, Field::as_prices)?;
        let portfolio = require(input, keys::PORTFOLIO, Field::as_portfolio)?;
        let risk = require(input, keys::RISK, Field::as_risk)?;
        let signals = WEIGHTS
            .iter()
            .map(|(key, _)| require(input, key, Field::as_signal))
            .collect::<Result<Vec<_>, _>>()?;

        let price = prices.last().map(|b| b.close).unwrap_or(0.0);
        let mut decision = decide(&Inputs {
            run_id,
            subject,
            price,
            portfolio,
            signals,
            risk,
            data_gaps: data_gaps(input),
        });
        if let Some(text) = self.narrate(subject, &decision.reasoning) {
            debug!(subject, "using model rationale");
            decision.reasoning = text;
        }
        info!(
            subject,
            action = %decision.action,
            quantity = decision.quantity,
            confidence = decision.confidence,
            "decision"
        );
        Ok(Record::new().with(keys::DECISION, Field::Decision(decision)))
    }

    fn fallback(&self, input: &Record<Field>, error: &StageError) -> Record<Field> {
        let text = |key: &str| input.get(key).and_then(Field::as_text).unwrap_or_default();
        let mut decision = Decision::hold(
            text(keys::RUN_ID),
            text(keys::SUBJECT),
            format!("Decision unavailable ({error}); holding"),
        );
        decision.data_gaps = data_gaps(input).to_vec();
        Record::new().with(keys::DECISION, Field::Decision(decision))
    }
}
