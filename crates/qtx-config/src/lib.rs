//! qtx-config
//!
//! Structured configuration types (`StrategyConfig`, `PortfolioConfig`,
//! `BacktestConfig`, `OptConfig`, `RiskConfig`) plus a layered JSON loader
//! with deterministic canonicalization and hashing. The filesystem/env/DB
//! loading surface itself is out of scope (§6 ConfigLoader is an external
//! collaborator); this crate owns only the structured data and the pure
//! merge/hash logic an external loader would call into.

mod loader;
mod types;

pub use loader::{load_layered_json, LoadedConfig};
pub use types::{
    BacktestConfig, OptConfig, PortfolioConfig, RiskConfig, StrategyConfig, StrategyFlags,
    SymbolCosts,
};
