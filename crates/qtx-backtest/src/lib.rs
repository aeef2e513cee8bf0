//! qtx-backtest
//!
//! Backtest coordinator (C10): the only crate in this workspace that owns
//! both a `qtx_portfolio::PortfolioManager` (by caller reference) and the
//! "real" `qtx_execution::ExecutionManager` + slippage model used to reprice
//! the portfolio's raw, commission-free execution intents. Drives the
//! signal-lag day loop and assembles `BacktestResults` (§4.10/§4.10.1).

mod coordinator;
mod metrics;
mod types;

pub use coordinator::BacktestCoordinator;
pub use types::{BacktestResults, TradeStats};
