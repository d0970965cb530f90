//! Insider-trading sentiment from the buy share of traded value.

use crate::domain::{CompositeScore, InsiderTrade, SignalLabel, TradeSide};

pub const BULLISH_BUY_RATIO: f64 = 0.7;
pub const BEARISH_BUY_RATIO: f64 = 0.3;
pub const MAX_CONFIDENCE: f64 = 0.9;

pub fn insider_sentiment(trades: &[InsiderTrade]) -> CompositeScore {
    let total = |side: TradeSide| -> f64 {
        trades
            .iter()
            .filter(|t| t.transaction_type == side)
            .map(|t| t.value)
            .sum()
    };
    let buy_value = total(TradeSide::Buy);
    let sell_value = total(TradeSide::Sell);

    if buy_value + sell_value == 0.0 {
        return CompositeScore::neutral();
    }

    let ratio = buy_value / (buy_value + sell_value);
    let (signal, confidence) = if ratio > BULLISH_BUY_RATIO {
        (SignalLabel::Bullish, ratio.min(MAX_CONFIDENCE))
    } else if ratio < BEARISH_BUY_RATIO {
        (SignalLabel::Bearish, (1.0 - ratio).min(MAX_CONFIDENCE))
    } else {
        (SignalLabel::Neutral, 0.5)
    };

    CompositeScore {
        signal,
        confidence,
        metrics: Default::default(),
    }
    .with_metric("buy_value", buy_value)
    .with_metric("sell_value", sell_value)
    .with_metric("buy_ratio", ratio)
}
