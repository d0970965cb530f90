//! Options-market sentiment from put/call volume and implied-volatility skew.

use crate::domain::{CompositeScore, OptionsSnapshot, SignalLabel};

pub const BEARISH_PUT_CALL: f64 = 1.5;
pub const BULLISH_PUT_CALL: f64 = 0.7;
pub const BEARISH_IV_SKEW: f64 = 1.2;
pub const BULLISH_IV_SKEW: f64 = 0.8;
pub const MAX_CONFIDENCE: f64 = 0.9;

/// Score an options snapshot. `None` (no usable chain) is neutral/0.5.
pub fn options_sentiment(snapshot: Option<&OptionsSnapshot>) -> CompositeScore {
    let Some(snap) = snapshot else {
        return CompositeScore::neutral();
    };

    let ratio = snap.put_call_ratio;
    let iv_skew = if snap.avg_call_iv > 0.0 {
        snap.avg_put_iv / snap.avg_call_iv
    } else {
        1.0
    };

    let (signal, confidence) = if ratio > BEARISH_PUT_CALL || iv_skew > BEARISH_IV_SKEW {
        (
            SignalLabel::Bearish,
            (ratio / 3.0).max(iv_skew / 2.0).min(MAX_CONFIDENCE),
        )
    } else if ratio < BULLISH_PUT_CALL || iv_skew < BULLISH_IV_SKEW {
        (
            SignalLabel::Bullish,
            (1.0 - ratio).max(1.0 - iv_skew).min(MAX_CONFIDENCE),
        )
    } else {
        (SignalLabel::Neutral, 0.5)
    };

    CompositeScore {
        signal,
        confidence,
        metrics: Default::default(),
    }
    .with_metric("put_call_ratio", ratio)
    .with_metric("iv_skew", iv_skew)
}
