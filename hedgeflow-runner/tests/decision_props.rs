//! Sizing and risk bounds of the terminal decision over random inputs.

use proptest::prelude::*;

use hedgeflow_core::domain::SignalLabel;
use hedgeflow_runner::stages::portfolio::{decide, Inputs};
use hedgeflow_runner::stages::risk::{risk_score, HALT_RISK};
use hedgeflow_runner::{AgentSignal, Portfolio, RiskAssessment, TradeAction};

fn label() -> impl Strategy<Value = SignalLabel> {
    prop_oneof![
        Just(SignalLabel::Bullish),
        Just(SignalLabel::Bearish),
        Just(SignalLabel::Neutral),
    ]
}

fn analysts() -> impl Strategy<Value = Vec<AgentSignal>> {
    prop::collection::vec((label(), 0.0f64..=1.0), 4).prop_map(|views| {
        ["valuation", "fundamentals", "technicals", "sentiment"]
            .iter()
            .zip(views)
            .map(|(agent, (label, confidence))| AgentSignal::new(agent, label, confidence, ""))
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn orders_respect_cash_limit_and_holdings(
        signals in analysts(),
        cash in 0.0f64..1.0e6,
        stock in 0.0f64..1.0e4,
        price in 1.0f64..1.0e3,
        max_position in 0.0f64..5.0e5,
        score in 0u8..=10,
    ) {
        let risk = RiskAssessment {
            signal: AgentSignal::new("risk_manager", SignalLabel::Neutral, 0.5, ""),
            risk_score: score,
            max_position_size: max_position,
            trading_action: TradeAction::Hold,
            annualized_volatility: 0.0,
            value_at_risk_95: 0.0,
            max_drawdown: 0.0,
        };
        let portfolio = Portfolio { cash, stock };
        let d = decide(&Inputs {
            run_id: "run",
            subject: "AAPL",
            price,
            portfolio: &portfolio,
            signals: signals.iter().collect(),
            risk: &risk,
            data_gaps: &[],
        });

        prop_assert!((0.0..=1.0).contains(&d.confidence));
        match d.action {
            TradeAction::Buy => {
                prop_assert!(d.quantity > 0);
                prop_assert!(d.quantity as f64 * price <= cash.min(max_position) + 1e-6);
                prop_assert!(score < HALT_RISK);
            }
            TradeAction::Sell => {
                prop_assert!(d.quantity > 0);
                prop_assert!(d.quantity as f64 <= stock);
                prop_assert!(score < HALT_RISK);
            }
            TradeAction::Hold => prop_assert_eq!(d.quantity, 0),
        }
    }

    #[test]
    fn risk_score_stays_in_range(
        vol in 0.0f64..3.0,
        var in -0.5f64..0.1,
        drawdown in -1.0f64..=0.0,
        labels in prop::collection::vec(label(), 0..6),
    ) {
        prop_assert!(risk_score(vol, var, drawdown, &labels) <= 10);
    }
}
