//! Provider-native shapes → canonical records.
//!
//! Missing numeric fields become 0. Derived quantities (growth rates,
//! recency, put/call ratio) are computed here so cached entries already carry
//! them.

use chrono::NaiveDate;

use super::provider::{
    DataError, QuoteSummary, RawBar, RawInsiderTransaction, RawOptionChain, StatementPeriod,
};
use crate::domain::{
    FinancialMetrics, InsiderTrade, LineItem, MarketSnapshot, OptionsSnapshot, PriceBar,
    StatementPair, TradeSide,
};

/// A reporting period older than this many days is stale.
pub const RECENCY_DAYS: i64 = 100;

/// Relative change from `previous` to `latest`. A zero denominator is
/// replaced by 1.
pub fn relative_growth(latest: f64, previous: f64) -> f64 {
    let denominator = if previous == 0.0 { 1.0 } else { previous };
    (latest - previous) / denominator
}

/// Drop bars without a usable close, sort ascending and de-duplicate dates.
pub fn price_bars(symbol: &str, raw: Vec<RawBar>) -> Result<Vec<PriceBar>, DataError> {
    let mut bars: Vec<PriceBar> = raw
        .into_iter()
        .filter(|b| b.close.is_finite())
        .map(|b| PriceBar {
            date: b.date,
            open: finite_or(b.open, b.close),
            high: finite_or(b.high, b.close),
            low: finite_or(b.low, b.close),
            close: b.close,
            volume: b.volume,
        })
        .collect();

    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);

    if bars.is_empty() {
        return Err(DataError::empty(symbol, "price bars"));
    }
    Ok(bars)
}

/// Build the metrics record from the quote summary and the statement history
/// (newest period first).
pub fn financial_metrics(
    symbol: &str,
    quote: &QuoteSummary,
    periods: &[StatementPeriod],
    today: NaiveDate,
) -> Result<FinancialMetrics, DataError> {
    let latest = periods
        .first()
        .ok_or_else(|| DataError::empty(symbol, "financial statements"))?;

    let revenue = latest.total_revenue.unwrap_or(0.0);
    let net_income = latest.net_income.unwrap_or(0.0);

    let (revenue_growth, earnings_growth) = match periods.get(1) {
        Some(prev) => (
            relative_growth(revenue, prev.total_revenue.unwrap_or(0.0)),
            relative_growth(net_income, prev.net_income.unwrap_or(0.0)),
        ),
        None => (0.0, 0.0),
    };

    let shares = quote.shares_outstanding.unwrap_or(0.0);
    let free_cash_flow_per_share = if shares > 0.0 {
        quote.free_cashflow.unwrap_or(0.0) / shares
    } else {
        0.0
    };

    let days_since_update = (today - latest.end_date).num_days();
    let forward_pe = quote.forward_pe.unwrap_or(0.0);
    let price_to_book = quote.price_to_book.unwrap_or(0.0);

    Ok(FinancialMetrics {
        market_cap: quote.market_cap.unwrap_or(0.0),
        pe_ratio: forward_pe,
        price_to_book,
        dividend_yield: quote.dividend_yield.unwrap_or(0.0),
        revenue,
        net_income,
        return_on_equity: quote.return_on_equity.unwrap_or(0.0),
        net_margin: quote.profit_margins.unwrap_or(0.0),
        operating_margin: quote.operating_margins.unwrap_or(0.0),
        revenue_growth,
        earnings_growth,
        // not reported upstream
        book_value_growth: 0.0,
        current_ratio: quote.current_ratio.unwrap_or(0.0),
        debt_to_equity: quote.debt_to_equity.unwrap_or(0.0),
        free_cash_flow_per_share,
        earnings_per_share: quote.trailing_eps.unwrap_or(0.0),
        price_to_earnings_ratio: forward_pe,
        price_to_book_ratio: price_to_book,
        price_to_sales_ratio: quote.price_to_sales.unwrap_or(0.0),
        data_timestamp: Some(latest.end_date),
        days_since_update: Some(days_since_update),
        is_data_recent: days_since_update <= RECENCY_DAYS,
    })
}

fn line_item(period: &StatementPeriod) -> LineItem {
    LineItem {
        free_cash_flow: period.free_cash_flow.unwrap_or(0.0),
        net_income: period.net_income.unwrap_or(0.0),
        depreciation_and_amortization: period.depreciation.unwrap_or(0.0),
        capital_expenditure: period.capital_expenditure.unwrap_or(0.0),
        working_capital: period.total_current_assets.unwrap_or(0.0)
            - period.total_current_liabilities.unwrap_or(0.0),
    }
}

/// The two most recent periods. A lone period is duplicated.
pub fn statement_pair(symbol: &str, periods: &[StatementPeriod]) -> Result<StatementPair, DataError> {
    match periods {
        [] => Err(DataError::empty(symbol, "financial statements")),
        [only] => {
            let item = line_item(only);
            Ok([item, item])
        }
        [latest, previous, ..] => Ok([line_item(latest), line_item(previous)]),
    }
}

/// Insider trades, newest first. Positive share counts are purchases.
pub fn insider_trades(raw: Vec<RawInsiderTransaction>) -> Vec<InsiderTrade> {
    let mut trades: Vec<InsiderTrade> = raw
        .into_iter()
        .map(|t| InsiderTrade {
            transaction_shares: t.shares,
            transaction_type: if t.shares > 0 {
                TradeSide::Buy
            } else {
                TradeSide::Sell
            },
            value: t.value.unwrap_or(0.0),
            date: t.date,
        })
        .collect();
    trades.sort_by(|a, b| b.date.cmp(&a.date));
    trades
}

/// Trailing window used for the volatility-index average.
pub const VIX_AVERAGE_WINDOW: usize = 50;

/// Combine the subject's quote with the auxiliary volatility-index and
/// treasury series. A missing auxiliary series zeroes only its own fields.
pub fn market_snapshot(
    quote: &QuoteSummary,
    vix: Option<&[RawBar]>,
    treasury: Option<&[RawBar]>,
) -> MarketSnapshot {
    let vix_closes: Vec<f64> = vix
        .unwrap_or_default()
        .iter()
        .map(|b| b.close)
        .filter(|c| c.is_finite())
        .collect();
    let current_vix = vix_closes.last().copied().unwrap_or(0.0);
    let window = &vix_closes[vix_closes.len().saturating_sub(VIX_AVERAGE_WINDOW)..];
    let vix_avg = if window.is_empty() {
        0.0
    } else {
        window.iter().sum::<f64>() / window.len() as f64
    };

    let treasury_yield = treasury
        .unwrap_or_default()
        .iter()
        .rev()
        .map(|b| b.close)
        .find(|c| c.is_finite())
        .unwrap_or(0.0);

    MarketSnapshot {
        market_cap: quote.market_cap.unwrap_or(0.0),
        volume: quote.volume.unwrap_or(0.0),
        average_volume: quote.average_volume.unwrap_or(0.0),
        fifty_two_week_high: quote.fifty_two_week_high.unwrap_or(0.0),
        fifty_two_week_low: quote.fifty_two_week_low.unwrap_or(0.0),
        vix: current_vix,
        vix_50d_avg: vix_avg,
        treasury_yield,
    }
}

fn mean_iv(contracts: &[super::provider::RawOptionContract]) -> f64 {
    let ivs: Vec<f64> = contracts
        .iter()
        .filter_map(|c| c.implied_volatility)
        .filter(|iv| iv.is_finite())
        .collect();
    if ivs.is_empty() {
        0.0
    } else {
        ivs.iter().sum::<f64>() / ivs.len() as f64
    }
}

/// Summarize the nearest-expiration chain.
pub fn options_snapshot(symbol: &str, chain: &RawOptionChain) -> Result<OptionsSnapshot, DataError> {
    if chain.calls.is_empty() && chain.puts.is_empty() {
        return Err(DataError::empty(symbol, "option contracts"));
    }

    let total_call_volume: u64 = chain.calls.iter().filter_map(|c| c.volume).sum();
    let total_put_volume: u64 = chain.puts.iter().filter_map(|c| c.volume).sum();
    let put_call_ratio = if total_call_volume > 0 {
        total_put_volume as f64 / total_call_volume as f64
    } else {
        0.0
    };

    Ok(OptionsSnapshot {
        expiration_date: Some(chain.expiration),
        put_call_ratio,
        avg_call_iv: mean_iv(&chain.calls),
        avg_put_iv: mean_iv(&chain.puts),
        total_call_volume,
        total_put_volume,
        call_open_interest: chain.calls.iter().filter_map(|c| c.open_interest).sum(),
        put_open_interest: chain.puts.iter().filter_map(|c| c.open_interest).sum(),
    })
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        fallback
    }
}
