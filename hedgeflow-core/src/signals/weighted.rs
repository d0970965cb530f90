//! Overall sentiment: weighted average of the four sub-signals.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::SignalLabel;

pub const BULLISH_THRESHOLD: f64 = 0.6;
pub const BEARISH_THRESHOLD: f64 = 0.4;

#[derive(Debug, Error, PartialEq)]
pub enum WeightError {
    #[error("sentiment weight '{name}' must be finite and non-negative, got {value}")]
    Invalid { name: &'static str, value: f64 },

    #[error("sentiment weights must sum to a positive total")]
    ZeroTotal,
}

/// Relative weight of each sub-signal. Normalized by their sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentimentWeights {
    pub news: f64,
    pub fear_greed: f64,
    pub options: f64,
    pub insider: f64,
}

impl Default for SentimentWeights {
    fn default() -> Self {
        Self {
            news: 0.3,
            fear_greed: 0.3,
            options: 0.2,
            insider: 0.2,
        }
    }
}

impl SentimentWeights {
    fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("news", self.news),
            ("fear_greed", self.fear_greed),
            ("options", self.options),
            ("insider", self.insider),
        ]
    }

    pub fn total(&self) -> f64 {
        self.named().iter().map(|(_, w)| w).sum()
    }

    pub fn validate(&self) -> Result<(), WeightError> {
        for (name, value) in self.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(WeightError::Invalid { name, value });
            }
        }
        if self.total() <= 0.0 {
            return Err(WeightError::ZeroTotal);
        }
        Ok(())
    }
}

/// Sub-signal scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub news: f64,
    /// Fear & greed index divided by 100.
    pub fear_greed: f64,
    /// Confidence of the options verdict.
    pub options: f64,
    /// Confidence of the insider verdict.
    pub insider: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedSentiment {
    pub score: f64,
    pub signal: SignalLabel,
    /// Confidence in [0, 1] before rounding.
    pub confidence: f64,
}

impl WeightedSentiment {
    /// Confidence as a whole percentage, e.g. `"62%"`.
    pub fn confidence_pct(&self) -> String {
        format!("{}%", (self.confidence * 100.0).round_ties_even() as i64)
    }
}

/// Weighted average of `scores`, labeled against the 0.6 / 0.4 thresholds.
///
/// Bullish confidence is the score itself, bearish its complement, neutral
/// the closeness to 0.5.
pub fn weighted_sentiment(scores: &SubScores, weights: &SentimentWeights) -> WeightedSentiment {
    let total = weights.total();
    let score = if total > 0.0 {
        (scores.news * weights.news
            + scores.fear_greed * weights.fear_greed
            + scores.options * weights.options
            + scores.insider * weights.insider)
            / total
    } else {
        0.5
    };

    let (signal, confidence) = if score >= BULLISH_THRESHOLD {
        (SignalLabel::Bullish, score)
    } else if score <= BEARISH_THRESHOLD {
        (SignalLabel::Bearish, 1.0 - score)
    } else {
        (SignalLabel::Neutral, 1.0 - (score - 0.5).abs() * 2.0)
    };

    WeightedSentiment {
        score,
        signal,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(news: f64, fear_greed: f64, options: f64, insider: f64) -> SubScores {
        SubScores {
            news,
            fear_greed,
            options,
            insider,
        }
    }

    #[test]
    fn bearish_confidence_is_complement() {
        let w = weighted_sentiment(&scores(0.2, 0.2, 0.2, 0.2), &SentimentWeights::default());
        assert_eq!(w.signal, SignalLabel::Bearish);
        assert_eq!(w.confidence_pct(), "80%");
    }

    #[test]
    fn neutral_confidence_peaks_at_midpoint() {
        let w = weighted_sentiment(&scores(0.5, 0.5, 0.5, 0.5), &SentimentWeights::default());
        assert_eq!(w.signal, SignalLabel::Neutral);
        assert_eq!(w.confidence_pct(), "100%");
    }

    #[test]
    fn percentage_halves_round_to_even() {
        let pct = |confidence| {
            WeightedSentiment {
                score: confidence,
                signal: SignalLabel::Bullish,
                confidence,
            }
            .confidence_pct()
        };
        assert_eq!(pct(0.625), "62%");
        assert_eq!(pct(0.875), "88%");
        assert_eq!(pct(0.626), "63%");
    }

    #[test]
    fn weights_are_normalized_by_total() {
        let weights = SentimentWeights {
            news: 3.0,
            fear_greed: 3.0,
            options: 2.0,
            insider: 2.0,
        };
        let a = weighted_sentiment(&scores(0.9, 0.1, 0.4, 0.7), &weights);
        let b = weighted_sentiment(&scores(0.9, 0.1, 0.4, 0.7), &SentimentWeights::default());
        assert!((a.score - b.score).abs() < 1e-12);
    }

    #[test]
    fn validation_rejects_bad_weights() {
        assert!(SentimentWeights::default().validate().is_ok());
        let negative = SentimentWeights {
            options: -0.1,
            ..Default::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(WeightError::Invalid { name: "options", .. })
        ));
        let zero = SentimentWeights {
            news: 0.0,
            fear_greed: 0.0,
            options: 0.0,
            insider: 0.0,
        };
        assert_eq!(zero.validate(), Err(WeightError::ZeroTotal));
    }
}
