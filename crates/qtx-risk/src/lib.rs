//! qtx-risk
//!
//! VaR/leverage/correlation risk contract (C9). Pure and deterministic: no
//! logging, no IO. The portfolio manager and backtest coordinator are the
//! only callers, and only they decide what to do with a breach (shrink
//! positions, log it via `tracing`).

mod engine;
mod types;

pub use engine::RiskManager;
pub use types::RiskResult;
