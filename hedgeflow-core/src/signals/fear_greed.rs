//! Momentum/volatility composite ("fear & greed"), 0 = extreme fear,
//! 100 = extreme greed.

use crate::domain::{MarketSnapshot, PriceBar};
use crate::indicators;

/// Moving-average window for the momentum sub-score.
pub const MOMENTUM_WINDOW: usize = 125;

/// Score returned when no sub-score is computable.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// The individual sub-scores; `None` when their inputs are missing.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FearGreedParts {
    pub momentum: Option<f64>,
    pub volatility: Option<f64>,
    pub volume: Option<f64>,
    pub safe_haven: Option<f64>,
}

impl FearGreedParts {
    pub fn compute(prices: &[PriceBar], market: &MarketSnapshot) -> Self {
        let closes = indicators::closes(prices);
        let momentum = match (
            closes.last().copied().filter(|c| c.is_finite()),
            indicators::sma_last(&closes, MOMENTUM_WINDOW),
        ) {
            (Some(price), Some(ma)) if ma > 0.0 => Some(clamp_score((price / ma - 1.0) * 100.0 + 50.0)),
            _ => None,
        };

        let volatility = (market.vix != 0.0 && market.vix_50d_avg != 0.0)
            .then(|| clamp_score((1.0 - market.vix / market.vix_50d_avg) * 100.0));

        let volume = (market.average_volume > 0.0)
            .then(|| clamp_score((market.volume / market.average_volume - 0.5) * 100.0));

        // higher yields read as less fear
        let safe_haven = (market.treasury_yield != 0.0)
            .then(|| clamp_score(market.treasury_yield * 10.0));

        Self {
            momentum,
            volatility,
            volume,
            safe_haven,
        }
    }

    pub fn available(&self) -> Vec<f64> {
        [self.momentum, self.volatility, self.volume, self.safe_haven]
            .into_iter()
            .flatten()
            .collect()
    }

    /// Mean of the available sub-scores, or [`NEUTRAL_SCORE`].
    pub fn score(&self) -> f64 {
        indicators::mean(&self.available()).unwrap_or(NEUTRAL_SCORE)
    }
}

/// Composite score in [0, 100].
pub fn fear_greed_index(prices: &[PriceBar], market: &MarketSnapshot) -> f64 {
    FearGreedParts::compute(prices, market).score()
}

fn clamp_score(v: f64) -> f64 {
    v.clamp(0.0, 100.0)
}
