use std::collections::BTreeMap;

use chrono::NaiveDate;
use qtx_core::{Decimal, ExecutionReport, Position, Timestamp};

/// Realised per-trade statistics accumulated over a closed (or flipped)
/// position, reported in aggregate on `BacktestResults`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TradeStats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub total_profit: Decimal,
    pub total_loss: Decimal,
    pub max_win: Decimal,
    pub max_loss: Decimal,
    pub holding_days_sum: i64,
}

/// The full result of one coordinator run (§3 BacktestResults / §4.10.1).
#[derive(Clone, Debug, PartialEq)]
pub struct BacktestResults {
    pub equity_curve: Vec<(Timestamp, Decimal)>,
    pub executions: Vec<ExecutionReport>,
    pub daily_positions: Vec<(NaiveDate, Vec<Position>)>,
    pub symbol_pnl: BTreeMap<String, Decimal>,
    pub warmup_days: usize,

    pub total_return: f64,
    pub volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub calmar: f64,
    pub var_95: f64,
    pub cvar_95: f64,
    pub beta: f64,
    pub correlation: f64,
    pub downside_vol: f64,
    pub avg_holding_period: f64,

    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: Decimal,
    pub avg_loss: Decimal,
    pub max_win: Decimal,
    pub max_loss: Decimal,
    pub winning_trades: usize,
    pub total_trades: usize,

    /// Keyed by (year, month), UTC calendar month of the equity curve point.
    pub monthly_returns: BTreeMap<(i32, u32), f64>,
}
