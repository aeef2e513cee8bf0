use std::collections::BTreeMap;

use qtx_core::{Bar, Decimal, Position, Timestamp};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StrategyState {
    Initialized,
    Running,
    Paused,
    Stopped,
    Error,
}

pub fn lifecycle_transition_allowed(from: StrategyState, to: StrategyState) -> bool {
    use StrategyState::*;
    matches!(
        (from, to),
        (Initialized, Running)
            | (Running, Paused)
            | (Paused, Running)
            | (Running, Stopped)
            | (Paused, Stopped)
            | (_, Error)
    )
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StrategyMetrics {
    pub total_trades: u64,
    pub winning_fills: u64,
    pub win_rate: f64,
    pub total_pnl: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct StrategyMetadata {
    pub name: String,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RiskLimits {
    pub max_leverage: f64,
    pub max_drawdown: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_leverage: 2.0,
            max_drawdown: 0.2,
        }
    }
}

/// Bar history for one symbol, append-only, unbounded (strategies decide
/// their own retention via `get_max_required_lookback`).
#[derive(Clone, Debug, Default)]
pub struct PriceHistory {
    pub bars: Vec<Bar>,
}

impl PriceHistory {
    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close.as_f64()).collect()
    }
}

pub type PositionBook = BTreeMap<String, Position>;
pub type PriceHistoryBook = BTreeMap<String, PriceHistory>;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RiskCheckResult {
    pub leverage: f64,
    pub leverage_breached: bool,
    pub drawdown: f64,
    pub drawdown_breached: bool,
}

impl RiskCheckResult {
    pub fn ok(&self) -> bool {
        !self.leverage_breached && !self.drawdown_breached
    }
}

/// Timestamped execution fed back into a strategy's `on_execution` hook.
#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionFeedback {
    pub symbol: String,
    pub side_is_buy: bool,
    pub filled_quantity: Decimal,
    pub fill_price: Decimal,
    pub fill_time: Timestamp,
}
