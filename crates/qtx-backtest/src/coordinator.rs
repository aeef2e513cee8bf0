//! Backtest coordinator (C10): the single cooperative-thread day loop that
//! drives a `PortfolioManager` through a bar stream with signal lag, reprices
//! its raw execution intents through the coordinator's own slippage model
//! and commission schedule, and folds daily PnL back into strategy state.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use qtx_config::BacktestConfig;
use qtx_core::{
    group_bars_by_timestamp, Bar, Decimal, EngineError, ErrorCode, ExecutionReport,
    PointValueSource, Position, Timestamp,
};
use qtx_execution::{ExecutionManager, SlippageModel};
use qtx_pnl::PnlManager;
use qtx_portfolio::PortfolioManager;
use qtx_price::PriceManager;

use crate::metrics;
use crate::types::BacktestResults;

pub struct BacktestCoordinator<'a> {
    config: BacktestConfig,
    pnl: PnlManager<'a>,
    price: PriceManager,
    execution: ExecutionManager,
}

impl<'a> BacktestCoordinator<'a> {
    pub fn new(config: BacktestConfig, point_values: &'a dyn PointValueSource) -> Self {
        let execution = ExecutionManager::new(
            config.commission_rate,
            Decimal::ZERO,
            Decimal::from_f64(config.slippage_bps),
        )
        .with_slippage_model(SlippageModel::FixedBps(Decimal::from_f64(config.slippage_bps)));

        Self {
            config,
            pnl: PnlManager::new(point_values),
            price: PriceManager::new(),
            execution,
        }
    }

    /// Swap in a different slippage model than the flat-bps default built
    /// from `config.slippage_bps` (e.g. `SlippageModel::spread_default()`).
    pub fn with_slippage_model(mut self, model: SlippageModel) -> Self {
        self.execution.slippage_model = Some(model);
        self
    }

    pub fn previous_day_price(&self, symbol: &str) -> Option<Decimal> {
        self.price.get_previous_day_price(symbol).ok()
    }

    /// Run the full day loop over `bars` (an unordered flat stream; grouped
    /// and sorted by timestamp internally). `benchmark_returns`, if given, is
    /// aligned 1:1 against the resulting equity curve's daily returns for
    /// `beta`/`correlation`.
    pub fn run(
        &mut self,
        portfolio: &mut PortfolioManager<'a>,
        bars: Vec<Bar>,
        benchmark_returns: Option<&[f64]>,
    ) -> Result<BacktestResults, EngineError> {
        if bars.is_empty() {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                "no bars loaded",
                "qtx-backtest::BacktestCoordinator::run",
            ));
        }

        let days = group_bars_by_timestamp(bars);
        for (_, day_bars) in &days {
            if day_bars.is_empty() {
                return Err(EngineError::new(
                    ErrorCode::InvalidArgument,
                    "a trading day has zero symbols",
                    "qtx-backtest::BacktestCoordinator::run",
                ));
            }
        }

        let warmup_days = portfolio.max_required_lookback().min(days.len());
        let initial_capital = self.config.portfolio_config.total_capital;

        let mut equity_curve: Vec<(Timestamp, Decimal)> = vec![(days[0].0, initial_capital)];
        let mut previous_bars: Option<Vec<Bar>> = None;
        let mut all_executions: Vec<ExecutionReport> = Vec::new();
        let mut symbol_pnl: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut daily_positions: Vec<(NaiveDate, Vec<Position>)> = Vec::new();
        let mut seen_dates: BTreeSet<NaiveDate> = BTreeSet::new();

        for (i, (stamp, today_bars)) in days.iter().enumerate() {
            let stamp = *stamp;

            if i < warmup_days {
                portfolio.process_market_data(today_bars, true, stamp)?;
                equity_curve.push((stamp, initial_capital));
            } else {
                let lagged = previous_bars
                    .as_ref()
                    .expect("previous_bars is set after the first day of the loop")
                    .clone();
                portfolio.process_market_data(&lagged, false, stamp)?;

                for bar in today_bars {
                    if let Some(model) = self.execution.slippage_model.as_mut() {
                        model.update(bar);
                    }
                }

                let raw_executions = portfolio.take_recent_executions();
                let mut today_commissions = Decimal::ZERO;
                for raw in &raw_executions {
                    let priced = self.execution.reprice(raw, stamp);
                    today_commissions = today_commissions + priced.commission;
                    portfolio.dispatch_execution(&priced);
                    all_executions.push(priced);
                }

                let today_bar_map: BTreeMap<String, Bar> =
                    today_bars.iter().map(|b| (b.symbol.clone(), b.clone())).collect();
                let today_closes: BTreeMap<String, Decimal> =
                    today_bar_map.iter().map(|(s, b)| (s.clone(), b.close)).collect();

                let mut total_portfolio_pnl = Decimal::ZERO;
                for strategy_id in portfolio.strategy_ids() {
                    let strategy_positions = portfolio
                        .get_strategy_positions(&strategy_id)
                        .cloned()
                        .unwrap_or_default();
                    for (symbol, position) in strategy_positions {
                        let curr_close = match today_closes.get(&symbol) {
                            Some(c) => *c,
                            None => continue,
                        };
                        if !self.pnl.has_previous_close(&symbol) {
                            self.pnl.set_previous_close(symbol.clone(), curr_close);
                            tracing::warn!(symbol = %symbol, "missing previous close, seeding and skipping daily PnL");
                            continue;
                        }
                        let pnl_result = self.pnl.calculate_position_pnl(&symbol, position.quantity, curr_close);
                        if !pnl_result.valid {
                            continue;
                        }
                        portfolio.update_strategy_position(&strategy_id, &symbol, pnl_result.daily_pnl, stamp)?;
                        total_portfolio_pnl = total_portfolio_pnl + pnl_result.daily_pnl;
                        let slot = symbol_pnl.entry(symbol).or_insert(Decimal::ZERO);
                        *slot = *slot + pnl_result.daily_pnl;
                    }
                }

                let previous_equity = equity_curve.last().unwrap().1;
                let new_equity = previous_equity + total_portfolio_pnl - today_commissions;
                equity_curve.push((stamp, new_equity));

                if self.config.portfolio_config.use_risk_management {
                    let risk = portfolio.evaluate_risk(&today_bar_map);
                    tracing::info!(
                        scale = risk.recommended_scale,
                        exceeded = risk.risk_exceeded,
                        "portfolio risk evaluated"
                    );
                }
            }

            self.pnl.update_previous_closes(
                &today_bars.iter().map(|b| (b.symbol.clone(), b.close)).collect(),
            );
            self.price.update_from_bars(today_bars);
            previous_bars = Some(today_bars.clone());

            let date = stamp.date_naive();
            if seen_dates.insert(date) {
                let snapshot: Vec<Position> = portfolio.get_portfolio_positions().into_values().collect();
                daily_positions.push((date, snapshot));
            }
        }

        Ok(metrics::compute(
            equity_curve,
            all_executions,
            symbol_pnl,
            daily_positions,
            warmup_days,
            benchmark_returns,
        ))
    }
}
