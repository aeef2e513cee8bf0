//! qtx-portfolio
//!
//! Portfolio manager (C7): coordinates a set of strategies under shared
//! capital. Owns per-strategy allocation bookkeeping, runs each strategy's
//! signal step, and diffs target positions into commission-free execution
//! intents priced off the previous close. Optionally routes the aggregated
//! targets of opted-in strategies through the optimizer and/or risk manager
//! before diffing. Deliberately does not own the real execution manager or
//! slippage model — those stay with the backtest coordinator, which reprices
//! the intents this crate produces.

mod manager;

pub use manager::PortfolioManager;
pub use qtx_risk::RiskResult;
