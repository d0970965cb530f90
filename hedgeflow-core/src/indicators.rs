//! Price-series indicators over close prices.
//!
//! Series functions return one value per input bar, NaN until the lookback is
//! filled and wherever a NaN input sits inside the window. `*_last` helpers
//! return the final value if it is defined.

use crate::domain::PriceBar;

/// Trading days per year used to annualize daily volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

pub fn closes(bars: &[PriceBar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Arithmetic mean of the finite values; `None` if there are none.
pub fn mean(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        None
    } else {
        Some(finite.iter().sum::<f64>() / finite.len() as f64)
    }
}

/// Simple moving average. First valid value at index `period - 1`.
pub fn sma(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum: f64 = closes[..period].iter().sum();
    let mut nan_in_window = closes[..period].iter().any(|c| c.is_nan());
    if !nan_in_window {
        result[period - 1] = sum / period as f64;
    }

    for i in period..n {
        let leaving = closes[i - period];
        let entering = closes[i];
        sum = sum - leaving + entering;

        // NaN poisons the running sum; rescan the window instead.
        if entering.is_nan() || leaving.is_nan() || nan_in_window {
            let window = &closes[(i + 1 - period)..=i];
            nan_in_window = window.iter().any(|c| c.is_nan());
            sum = window.iter().sum();
            if nan_in_window {
                continue;
            }
        }

        result[i] = sum / period as f64;
    }

    result
}

pub fn sma_last(closes: &[f64], period: usize) -> Option<f64> {
    last_defined(&sma(closes, period))
}

/// Relative Strength Index with Wilder smoothing. First value at index `period`.
///
/// avg_loss == 0 gives 100, avg_gain == 0 gives 0, no movement gives 50.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period + 1 {
        return result;
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for &ch in &changes[..period] {
        if ch.is_nan() {
            return result;
        }
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    result[period] = rsi_value(avg_gain, avg_loss);

    let alpha = 1.0 / period as f64;
    for i in (period + 1)..n {
        let ch = changes[i - 1];
        if ch.is_nan() {
            return result;
        }
        let gain = ch.max(0.0);
        let loss = (-ch).max(0.0);
        avg_gain = alpha * gain + (1.0 - alpha) * avg_gain;
        avg_loss = alpha * loss + (1.0 - alpha) * avg_loss;
        result[i] = rsi_value(avg_gain, avg_loss);
    }

    result
}

pub fn rsi_last(closes: &[f64], period: usize) -> Option<f64> {
    last_defined(&rsi(closes, period))
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Fractional change of the last close over `period` bars.
pub fn rate_of_change(closes: &[f64], period: usize) -> Option<f64> {
    let n = closes.len();
    if period == 0 || n <= period {
        return None;
    }
    let prev = closes[n - 1 - period];
    let curr = closes[n - 1];
    if prev.is_nan() || curr.is_nan() || prev == 0.0 {
        return None;
    }
    Some((curr - prev) / prev)
}

/// Simple daily returns, skipping pairs with a NaN or zero base.
pub fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0].is_finite() && w[1].is_finite() && w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

/// Sample standard deviation of daily returns, annualized.
pub fn annualized_volatility(closes: &[f64]) -> Option<f64> {
    let returns = daily_returns(closes);
    if returns.len() < 2 {
        return None;
    }
    let m = returns.iter().sum::<f64>() / returns.len() as f64;
    let var = returns.iter().map(|r| (r - m).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
    Some(var.sqrt() * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Largest peak-to-trough decline as a non-positive fraction (0 for a
/// monotonically rising series).
pub fn max_drawdown(closes: &[f64]) -> f64 {
    let mut peak = f64::NAN;
    let mut worst: f64 = 0.0;
    for &c in closes.iter().filter(|c| c.is_finite()) {
        if peak.is_nan() || c > peak {
            peak = c;
        }
        if peak > 0.0 {
            worst = worst.min(c / peak - 1.0);
        }
    }
    worst
}

fn last_defined(series: &[f64]) -> Option<f64> {
    series.last().copied().filter(|v| v.is_finite())
}
