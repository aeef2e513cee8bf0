//! The `Strategy` capability set: every pluggable strategy implementation
//! (the reference trend-following strategy included) exposes the same
//! lifecycle, data, and risk surface so the portfolio manager and backtest
//! coordinator can drive any of them interchangeably.

use std::collections::BTreeMap;

use qtx_core::{Bar, Decimal, EngineError, Position, Timestamp};

use crate::types::{
    ExecutionFeedback, RiskCheckResult, RiskLimits, StrategyMetadata, StrategyMetrics,
    StrategyState,
};

pub trait Strategy {
    /// Move from `Initialized` to `Running`. Idempotent-unsafe: calling it
    /// twice without an intervening stop is an invalid transition.
    fn start(&mut self) -> Result<(), EngineError>;
    fn pause(&mut self) -> Result<(), EngineError>;
    fn resume(&mut self) -> Result<(), EngineError>;
    fn stop(&mut self) -> Result<(), EngineError>;
    fn get_state(&self) -> StrategyState;

    /// Feed one timestamp's bars (possibly many symbols) into the strategy.
    /// The strategy is responsible for maintaining its own lookback history.
    fn on_data(&mut self, bars: &[Bar]) -> Result<(), EngineError>;

    /// Notify the strategy that one of its orders was filled.
    fn on_execution(&mut self, fill: &ExecutionFeedback);

    /// Recompute target positions from currently buffered data. Called once
    /// per day by the coordinator after `on_data`; separated from `on_data`
    /// so strategies can batch multi-symbol updates before resizing.
    fn on_signal(&mut self) -> Result<(), EngineError>;

    fn get_positions(&self) -> &BTreeMap<String, Position>;
    fn get_target_positions(&self) -> &BTreeMap<String, Decimal>;

    /// Write-through used by the portfolio manager to record a day's
    /// mark-to-market PnL against one of this strategy's positions.
    fn apply_daily_pnl(&mut self, symbol: &str, daily_pnl: Decimal, at: Timestamp);
    fn get_price_history_len(&self, symbol: &str) -> usize;
    fn get_metrics(&self) -> &StrategyMetrics;
    fn get_metadata(&self) -> &StrategyMetadata;

    fn update_risk_limits(&mut self, limits: RiskLimits);
    fn check_risk_limits(&self, point_value: &dyn Fn(&str) -> Decimal) -> RiskCheckResult;

    fn set_backtest_mode(&mut self, enabled: bool);

    /// Minimum number of historical bars this strategy needs before its
    /// signals are meaningful. The coordinator treats this as the warmup
    /// length and withholds trading until each symbol has this many bars.
    fn get_max_required_lookback(&self) -> usize;
}
