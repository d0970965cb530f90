//! Intrinsic value from owner earnings and discounted free cash flow,
//! compared with market capitalization.

use hedgeflow_core::domain::{FinancialMetrics, LineItem, RecordKind, SignalLabel, StatementPair};
use hedgeflow_core::graph::{Record, Stage, StageError};

use super::{report, unavailable};
use crate::decision::AgentSignal;
use crate::field::{has_gap, keys, require, Field};

const PROJECTION_YEARS: i32 = 5;
const REQUIRED_RETURN: f64 = 0.15;
const DISCOUNT_RATE: f64 = 0.10;
const TERMINAL_GROWTH: f64 = 0.03;
const MARGIN_OF_SAFETY: f64 = 0.25;
/// Growth assumptions are clamped to this band.
const MAX_GROWTH: f64 = 0.25;
/// A gap beyond this fraction of market cap is a directional signal.
const GAP_THRESHOLD: f64 = 0.15;

pub struct ValuationStage;

/// Net income + D&A - capex - change in working capital.
pub fn owner_earnings(current: &LineItem, previous: &LineItem) -> f64 {
    current.net_income + current.depreciation_and_amortization
        - current.capital_expenditure.abs()
        - (current.working_capital - previous.working_capital)
}

/// Five years of owner earnings discounted at the required return, plus a
/// terminal value, less a margin of safety. Zero when owner earnings are not
/// positive.
pub fn owner_earnings_value(owner_earnings: f64, growth: f64) -> f64 {
    if owner_earnings <= 0.0 {
        return 0.0;
    }
    let mut last = 0.0;
    let mut total = 0.0;
    for year in 1..=PROJECTION_YEARS {
        let discounted =
            owner_earnings * (1.0 + growth).powi(year) / (1.0 + REQUIRED_RETURN).powi(year);
        total += discounted;
        last = discounted;
    }
    let terminal_growth = growth.min(TERMINAL_GROWTH);
    let terminal = last * (1.0 + terminal_growth) / (REQUIRED_RETURN - terminal_growth);
    let terminal_pv = terminal / (1.0 + REQUIRED_RETURN).powi(PROJECTION_YEARS);
    (total + terminal_pv) * (1.0 - MARGIN_OF_SAFETY)
}

/// Discounted free cash flow over five years plus a Gordon-growth terminal
/// value.
pub fn discounted_cash_flow(free_cash_flow: f64, growth: f64) -> f64 {
    if free_cash_flow <= 0.0 {
        return 0.0;
    }
    let mut flow = free_cash_flow;
    let mut present = 0.0;
    for year in 1..=PROJECTION_YEARS {
        present += flow / (1.0 + DISCOUNT_RATE).powi(year);
        if year < PROJECTION_YEARS {
            flow *= 1.0 + growth;
        }
    }
    let terminal = flow * (1.0 + TERMINAL_GROWTH) / (DISCOUNT_RATE - TERMINAL_GROWTH);
    present + terminal / (1.0 + DISCOUNT_RATE).powi(PROJECTION_YEARS)
}

fn gap(value: f64, market_cap: f64) -> f64 {
    (value - market_cap) / market_cap
}

pub fn analyze(metrics: &FinancialMetrics, statements: &StatementPair) -> AgentSignal {
    let market_cap = metrics.market_cap;
    if market_cap <= 0.0 {
        return AgentSignal::new(
            keys::VALUATION,
            SignalLabel::Neutral,
            0.0,
            "Market capitalization unavailable; no valuation",
        );
    }

    let [current, previous] = statements;
    let growth = metrics.earnings_growth.clamp(-MAX_GROWTH, MAX_GROWTH);
    let oe = owner_earnings(current, previous);
    let oe_value = owner_earnings_value(oe, growth);
    let dcf_value = discounted_cash_flow(current.free_cash_flow, growth);

    let oe_gap = gap(oe_value, market_cap);
    let dcf_gap = gap(dcf_value, market_cap);
    let valuation_gap = (oe_gap + dcf_gap) / 2.0;

    let signal = if valuation_gap > GAP_THRESHOLD {
        SignalLabel::Bullish
    } else if valuation_gap < -GAP_THRESHOLD {
        SignalLabel::Bearish
    } else {
        SignalLabel::Neutral
    };
    let confidence = match signal {
        SignalLabel::Neutral => 0.5,
        _ => valuation_gap.abs().min(1.0),
    };

    let reasoning = format!(
        "Owner earnings analysis: value ${oe_value:.0} vs market cap ${market_cap:.0} (gap {:.1}%)\n\
         DCF analysis: value ${dcf_value:.0} vs market cap ${market_cap:.0} (gap {:.1}%)\n\
         Average valuation gap {:.1}%",
        oe_gap * 100.0,
        dcf_gap * 100.0,
        valuation_gap * 100.0,
    );

    AgentSignal::new(keys::VALUATION, signal, confidence, reasoning)
        .with_metric("owner_earnings", oe)
        .with_metric("owner_earnings_value", oe_value)
        .with_metric("dcf_value", dcf_value)
        .with_metric("valuation_gap", valuation_gap)
}

impl Stage<Field> for ValuationStage {
    fn name(&self) -> &str {
        keys::VALUATION
    }

    fn run(&self, input: &Record<Field>) -> Result<Record<Field>, StageError> {
        let metrics = require(input, keys::FINANCIAL_METRICS, Field::as_metrics)?;
        let statements = require(input, keys::STATEMENTS, Field::as_statements)?;
        let mut signal = analyze(metrics, statements);
        if has_gap(input, RecordKind::FinancialStatements.as_str()) {
            signal.confidence = 0.0;
            signal.signal = SignalLabel::Neutral;
            signal.reasoning.push_str("\nFinancial statements unavailable; valuation not trusted");
        }
        report(input, &signal);
        Ok(Record::new().with(keys::VALUATION, Field::Signal(signal)))
    }

    fn fallback(&self, _input: &Record<Field>, error: &StageError) -> Record<Field> {
        unavailable(keys::VALUATION, error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(fcf: f64, ni: f64, wc: f64) -> LineItem {
        LineItem {
            free_cash_flow: fcf,
            net_income: ni,
            depreciation_and_amortization: 10.0,
            capital_expenditure: -20.0,
            working_capital: wc,
        }
    }

    #[test]
    fn owner_earnings_uses_capex_magnitude() {
        // 100 + 10 - 20 - (60 - 50)
        assert_eq!(owner_earnings(&item(0.0, 100.0, 60.0), &item(0.0, 0.0, 50.0)), 80.0);
    }

    #[test]
    fn non_positive_cash_flows_are_worth_nothing() {
        assert_eq!(owner_earnings_value(-5.0, 0.1), 0.0);
        assert_eq!(discounted_cash_flow(0.0, 0.1), 0.0);
    }

    #[test]
    fn dcf_with_zero_growth_matches_closed_form() {
        let v = discounted_cash_flow(100.0, 0.0);
        let annuity: f64 = (1..=5).map(|y| 100.0 / 1.1_f64.powi(y)).sum();
        let terminal = 100.0 * 1.03 / 0.07 / 1.1_f64.powi(5);
        assert!((v - (annuity + terminal)).abs() < 1e-9);
    }

    #[test]
    fn cheap_company_is_bullish() {
        let metrics = FinancialMetrics {
            market_cap: 300.0,
            earnings_growth: 0.05,
            ..Default::default()
        };
        let s = analyze(&metrics, &[item(100.0, 100.0, 50.0), item(90.0, 90.0, 50.0)]);
        assert_eq!(s.signal, SignalLabel::Bullish);
        assert_eq!(s.confidence, 1.0);
    }

    #[test]
    fn expensive_company_is_bearish() {
        let metrics = FinancialMetrics {
            market_cap: 1.0e6,
            ..Default::default()
        };
        let s = analyze(&metrics, &[item(100.0, 100.0, 50.0), item(90.0, 90.0, 50.0)]);
        assert_eq!(s.signal, SignalLabel::Bearish);
        assert!(s.metrics["valuation_gap"] < -0.99);
    }

    #[test]
    fn zero_market_cap_gives_no_view() {
        let s = analyze(&FinancialMetrics::default(), &StatementPair::default());
        assert_eq!(s.signal, SignalLabel::Neutral);
        assert_eq!(s.confidence, 0.0);
    }
}
