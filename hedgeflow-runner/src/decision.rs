//! Stage verdicts and the terminal decision.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use hedgeflow_core::domain::SignalLabel;
use hedgeflow_core::graph::StageError;

/// One analysis stage's verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSignal {
    pub agent: String,
    pub signal: SignalLabel,
    pub confidence: f64,
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, f64>,
}

impl AgentSignal {
    pub fn new(
        agent: &str,
        signal: SignalLabel,
        confidence: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.to_string(),
            signal,
            confidence: confidence.clamp(0.0, 1.0),
            reasoning: reasoning.into(),
            metrics: BTreeMap::new(),
        }
    }

    /// Neutral, zero-confidence verdict written when a stage fails.
    pub fn unavailable(agent: &str, error: &StageError) -> Self {
        Self::new(
            agent,
            SignalLabel::Neutral,
            0.0,
            format!("{agent} unavailable: {error}"),
        )
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn confidence_pct(&self) -> String {
        format!("{}%", (self.confidence * 100.0).round_ties_even() as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
    Hold,
}

impl TradeAction {
    pub fn from_signal(signal: SignalLabel) -> Self {
        match signal {
            SignalLabel::Bullish => TradeAction::Buy,
            SignalLabel::Bearish => TradeAction::Sell,
            SignalLabel::Neutral => TradeAction::Hold,
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TradeAction::Buy => "buy",
            TradeAction::Sell => "sell",
            TradeAction::Hold => "hold",
        })
    }
}

/// Output of the risk stage: sizing limits plus the consolidated analyst view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub signal: AgentSignal,
    /// 0 (calm) to 10 (do not trade).
    pub risk_score: u8,
    /// Largest position value allowed, in cash terms.
    pub max_position_size: f64,
    pub trading_action: TradeAction,
    pub annualized_volatility: f64,
    pub value_at_risk_95: f64,
    pub max_drawdown: f64,
}

/// The pipeline's final answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub run_id: String,
    pub subject: String,
    pub action: TradeAction,
    pub quantity: u64,
    pub confidence: f64,
    pub agent_signals: Vec<AgentSignal>,
    pub reasoning: String,
    #[serde(default)]
    pub data_gaps: Vec<String>,
    /// Stages that fell back to their degraded output.
    #[serde(default)]
    pub degraded_stages: Vec<String>,
}

impl Decision {
    /// Hold everything. Used when the decision stage itself cannot produce
    /// a verdict.
    pub fn hold(run_id: &str, subject: &str, reasoning: impl Into<String>) -> Self {
        Self {
            run_id: run_id.to_string(),
            subject: subject.to_string(),
            action: TradeAction::Hold,
            quantity: 0,
            confidence: 0.0,
            agent_signals: Vec::new(),
            reasoning: reasoning.into(),
            data_gaps: Vec::new(),
            degraded_stages: Vec::new(),
        }
    }
}
