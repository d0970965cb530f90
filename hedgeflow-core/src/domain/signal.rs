//! Categorical verdicts shared by scorers and analysis stages.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Directional label of a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalLabel {
    Bullish,
    Bearish,
    Neutral,
}

impl SignalLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalLabel::Bullish => "bullish",
            SignalLabel::Bearish => "bearish",
            SignalLabel::Neutral => "neutral",
        }
    }

    /// +1 for bullish, -1 for bearish, 0 for neutral.
    pub fn direction(&self) -> f64 {
        match self {
            SignalLabel::Bullish => 1.0,
            SignalLabel::Bearish => -1.0,
            SignalLabel::Neutral => 0.0,
        }
    }
}

impl fmt::Display for SignalLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bounded verdict: label, confidence in [0, 1], and the metrics that
/// explain it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeScore {
    pub signal: SignalLabel,
    pub confidence: f64,
    pub metrics: BTreeMap<String, f64>,
}

impl CompositeScore {
    /// The neutral verdict used whenever a scorer has nothing to go on.
    pub fn neutral() -> Self {
        Self {
            signal: SignalLabel::Neutral,
            confidence: 0.5,
            metrics: BTreeMap::new(),
        }
    }

    pub fn with_metric(mut self, name: &str, value: f64) -> Self {
        self.metrics.insert(name.to_string(), value);
        self
    }

    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}
