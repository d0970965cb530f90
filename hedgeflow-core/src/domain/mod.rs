//! Domain types: canonical fetched records and signal verdicts.

pub mod records;
pub mod signal;

pub use records::{
    FinancialMetrics, InsiderTrade, LineItem, MarketSnapshot, OptionsSnapshot, PriceBar,
    RecordKind, StatementPair, TradeSide,
};
pub use signal::{CompositeScore, SignalLabel};
