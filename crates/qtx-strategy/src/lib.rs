//! qtx-strategy
//!
//! The `Strategy` capability trait (C6), shared lifecycle/accounting
//! bookkeeping (`base::StrategyCore`), and the reference trend-following
//! implementation.

mod base;
mod trend;
mod types;

#[allow(clippy::module_inception)]
mod r#trait;

pub use base::StrategyCore;
pub use r#trait::Strategy;
pub use trend::{TrendFollowingConfig, TrendFollowingStrategy, TrendRule};
pub use types::{
    lifecycle_transition_allowed, ExecutionFeedback, PositionBook, PriceHistory,
    PriceHistoryBook, RiskCheckResult, RiskLimits, StrategyMetadata, StrategyMetrics,
    StrategyState,
};
