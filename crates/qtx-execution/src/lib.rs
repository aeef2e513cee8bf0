//! qtx-execution
//!
//! Execution manager (C4) and slippage model (C5): diff current vs target
//! positions into priced `ExecutionReport`s. Pure deterministic logic, no
//! IO, no broker wiring — the coordinator is the only caller.

mod engine;
mod slippage;

pub use engine::ExecutionManager;
pub use slippage::SlippageModel;
