//! Portfolio manager (C7): owns the set of strategies, aggregates their
//! target positions into per-strategy executions priced off the previous
//! close, and optionally runs the dynamic optimizer and/or risk manager over
//! the aggregate before diffing. Unlike the pure leaf crates, this one is an
//! orchestration boundary, so it logs via `tracing` at the same "recover
//! locally" points the coordinator does.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use qtx_config::PortfolioConfig;
use qtx_core::{
    Bar, Decimal, EngineError, ErrorCode, ExecutionReport, PointValueSource, Position, Side,
    Timestamp,
};
use qtx_strategy::{ExecutionFeedback, Strategy};

use qtx_risk::RiskResult;

/// Rolling history retention, matching the execution/strategy crates'
/// ten-year daily-bar ceiling.
const MAX_HISTORY: usize = 2520;
/// Same noise floor the execution manager uses for "is this delta worth
/// trading".
const MIN_TRADE_DELTA: f64 = 1e-4;

struct StrategyEntry {
    strategy: Box<dyn Strategy + Send>,
    allocation: f64,
    use_optimization: bool,
    use_risk_management: bool,
    prior_targets: BTreeMap<String, Decimal>,
}

pub struct PortfolioManager<'a> {
    config: PortfolioConfig,
    strategies: BTreeMap<String, StrategyEntry>,
    recent_executions: Vec<ExecutionReport>,
    strategy_executions: BTreeMap<String, Vec<ExecutionReport>>,
    price_history: BTreeMap<String, VecDeque<Bar>>,
    returns_history: BTreeMap<String, VecDeque<f64>>,
    previous_day_close_prices: BTreeMap<String, Decimal>,
    point_values: &'a dyn PointValueSource,
    sequence: u64,
}

impl<'a> PortfolioManager<'a> {
    pub fn new(config: PortfolioConfig, point_values: &'a dyn PointValueSource) -> Self {
        Self {
            config,
            strategies: BTreeMap::new(),
            recent_executions: Vec::new(),
            strategy_executions: BTreeMap::new(),
            price_history: BTreeMap::new(),
            returns_history: BTreeMap::new(),
            previous_day_close_prices: BTreeMap::new(),
            point_values,
            sequence: 0,
        }
    }

    pub fn config(&self) -> &PortfolioConfig {
        &self.config
    }

    pub fn strategy_ids(&self) -> Vec<String> {
        self.strategies.keys().cloned().collect()
    }

    pub fn add_strategy(
        &mut self,
        id: impl Into<String>,
        strategy: Box<dyn Strategy + Send>,
        allocation: f64,
        use_optimization: bool,
        use_risk_management: bool,
    ) -> Result<(), EngineError> {
        let id = id.into();
        if self.strategies.contains_key(&id) {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                format!("strategy '{id}' is already registered"),
                "qtx-portfolio::PortfolioManager::add_strategy",
            ));
        }
        if allocation < self.config.min_strategy_allocation || allocation > self.config.max_strategy_allocation {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                format!(
                    "allocation {allocation} outside [{}, {}]",
                    self.config.min_strategy_allocation, self.config.max_strategy_allocation
                ),
                "qtx-portfolio::PortfolioManager::add_strategy",
            ));
        }
        let existing: f64 = self.strategies.values().map(|e| e.allocation).sum();
        if existing + allocation > 1.0 + 1e-9 {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                format!("total strategy allocation {} would exceed 1.0", existing + allocation),
                "qtx-portfolio::PortfolioManager::add_strategy",
            ));
        }

        self.strategies.insert(
            id.clone(),
            StrategyEntry {
                strategy,
                allocation,
                use_optimization,
                use_risk_management,
                prior_targets: BTreeMap::new(),
            },
        );
        tracing::info!(strategy_id = %id, allocation, "strategy added to portfolio");
        Ok(())
    }

    /// Accepts `m` iff `|sum(m) - 1| <= 1e-9`, every value lies in
    /// `[min_strategy_allocation, max_strategy_allocation]`, and `m` names
    /// exactly the currently-registered strategies (§8 invariant 5).
    pub fn update_allocations(&mut self, allocations: &BTreeMap<String, f64>) -> Result<(), EngineError> {
        let total: f64 = allocations.values().sum();
        if (total - 1.0).abs() > 1e-9 {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                format!("allocations must sum to 1.0, got {total}"),
                "qtx-portfolio::PortfolioManager::update_allocations",
            ));
        }
        if allocations.len() != self.strategies.len() {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                "update_allocations must specify every registered strategy",
                "qtx-portfolio::PortfolioManager::update_allocations",
            ));
        }
        for (id, alloc) in allocations {
            if !self.strategies.contains_key(id) {
                return Err(EngineError::new(
                    ErrorCode::InvalidArgument,
                    format!("unknown strategy '{id}'"),
                    "qtx-portfolio::PortfolioManager::update_allocations",
                ));
            }
            if *alloc < self.config.min_strategy_allocation || *alloc > self.config.max_strategy_allocation {
                return Err(EngineError::new(
                    ErrorCode::InvalidArgument,
                    format!("allocation for '{id}' outside configured bounds"),
                    "qtx-portfolio::PortfolioManager::update_allocations",
                ));
            }
        }
        for (id, alloc) in allocations {
            self.strategies.get_mut(id).unwrap().allocation = *alloc;
        }
        Ok(())
    }

    pub fn max_required_lookback(&self) -> usize {
        self.strategies.values().map(|e| e.strategy.get_max_required_lookback()).max().unwrap_or(0)
    }

    /// Drive one day's bars through every strategy.
    ///
    /// 1. Update rolling price/return history.
    /// 2. `on_data` + `on_signal` each strategy to get this call's targets.
    /// 3. If optimization/risk management is enabled, adjust the aggregated
    ///    targets of opted-in strategies before diffing.
    /// 4. Unless `skip_execution_generation`, diff old vs new targets per
    ///    strategy, priced off the previous call's closes, into
    ///    `ExecutionReport`s (commission-free, unsliced — the coordinator
    ///    applies slippage and commission when it drains these).
    /// 5. Roll `previous_day_close_prices` forward to this call's own closes.
    pub fn process_market_data(
        &mut self,
        bars: &[Bar],
        skip_execution_generation: bool,
        stamp: Timestamp,
    ) -> Result<(), EngineError> {
        self.update_history(bars);

        let mut new_targets_by_strategy: BTreeMap<String, BTreeMap<String, Decimal>> = BTreeMap::new();
        for (id, entry) in self.strategies.iter_mut() {
            entry.strategy.on_data(bars)?;
            entry.strategy.on_signal()?;
            new_targets_by_strategy.insert(id.clone(), entry.strategy.get_target_positions().clone());
        }

        if !skip_execution_generation && (self.config.use_optimization || self.config.use_risk_management) {
            self.apply_portfolio_level_constraints(&mut new_targets_by_strategy, bars);
        }

        if !skip_execution_generation {
            for (id, entry) in self.strategies.iter_mut() {
                let new_targets = &new_targets_by_strategy[id];
                let execs = diff_to_executions(
                    &entry.prior_targets,
                    new_targets,
                    &self.previous_day_close_prices,
                    bars,
                    stamp,
                    id,
                    &mut self.sequence,
                );
                if !execs.is_empty() {
                    self.strategy_executions.entry(id.clone()).or_default().extend(execs.iter().cloned());
                    self.recent_executions.extend(execs);
                }
            }
        }

        for (id, entry) in self.strategies.iter_mut() {
            if let Some(targets) = new_targets_by_strategy.remove(id) {
                entry.prior_targets = targets;
            }
        }

        for bar in bars {
            self.previous_day_close_prices.insert(bar.symbol.clone(), bar.close);
        }

        Ok(())
    }

    fn update_history(&mut self, bars: &[Bar]) {
        for bar in bars {
            let closes = self.price_history.entry(bar.symbol.clone()).or_default();
            let prev_close = closes.back().map(|b| b.close.as_f64());
            closes.push_back(bar.clone());
            if closes.len() > MAX_HISTORY {
                closes.pop_front();
            }

            if let Some(prev) = prev_close {
                if prev.abs() > f64::EPSILON {
                    let ret = (bar.close.as_f64() - prev) / prev;
                    let rets = self.returns_history.entry(bar.symbol.clone()).or_default();
                    rets.push_back(ret);
                    if rets.len() > MAX_HISTORY {
                        rets.pop_front();
                    }
                }
            }
        }
    }

    /// Adjust the opted-in strategies' freshly-computed targets in place,
    /// before diffing: first the optimizer's per-symbol tracking-error
    /// solution (applied as a ratio against the unconstrained aggregate),
    /// then a uniform risk scale-down if the risk manager flags a breach.
    /// Costs default to zero since per-symbol cost models live on the
    /// strategy configs, not on the portfolio.
    fn apply_portfolio_level_constraints(
        &self,
        new_targets_by_strategy: &mut BTreeMap<String, BTreeMap<String, Decimal>>,
        bars: &[Bar],
    ) {
        let today_bars: BTreeMap<String, Bar> = bars.iter().map(|b| (b.symbol.clone(), b.clone())).collect();

        let mut aggregate_current: BTreeMap<String, Decimal> = BTreeMap::new();
        for entry in self.strategies.values() {
            for (symbol, pos) in entry.strategy.get_positions() {
                let slot = aggregate_current.entry(symbol.clone()).or_insert(Decimal::ZERO);
                *slot = *slot + pos.quantity;
            }
        }

        let mut aggregate_target: BTreeMap<String, Decimal> = BTreeMap::new();
        for (id, targets) in new_targets_by_strategy.iter() {
            let opted_in = self
                .strategies
                .get(id)
                .map(|e| e.use_optimization || e.use_risk_management)
                .unwrap_or(false);
            if !opted_in {
                continue;
            }
            for (symbol, qty) in targets {
                let slot = aggregate_target.entry(symbol.clone()).or_insert(Decimal::ZERO);
                *slot = *slot + *qty;
            }
        }
        if aggregate_target.is_empty() {
            return;
        }

        let mut symbol_ratio: BTreeMap<String, f64> = BTreeMap::new();
        if self.config.use_optimization && self.strategies.values().any(|e| e.use_optimization) {
            let covariance = build_covariance(&self.returns_history, self.config.risk_config.lookback_days);
            let optimizer = qtx_optimizer::Optimizer::new(self.config.opt_config.clone());
            let result = optimizer.optimize(
                &aggregate_current,
                &aggregate_target,
                &BTreeMap::new(),
                &BTreeMap::new(),
                &covariance,
            );
            for (symbol, optimized_qty) in &result.positions {
                let raw = aggregate_target.get(symbol).copied().unwrap_or(Decimal::ZERO).as_f64();
                if raw.abs() > 1e-9 {
                    symbol_ratio.insert(symbol.clone(), optimized_qty.as_f64() / raw);
                }
            }
        }

        let mut uniform_scale = 1.0_f64;
        if self.config.use_risk_management && self.strategies.values().any(|e| e.use_risk_management) {
            let plain_returns = self.plain_returns_history();
            let risk = qtx_risk::RiskManager::evaluate(
                &aggregate_target,
                &today_bars,
                &plain_returns,
                self.point_values,
                &self.config.risk_config,
            );
            if risk.risk_exceeded {
                tracing::warn!(scale = risk.recommended_scale, "portfolio risk limit breached, scaling targets");
                uniform_scale = risk.recommended_scale;
            }
        }

        for (id, targets) in new_targets_by_strategy.iter_mut() {
            let entry = match self.strategies.get(id) {
                Some(e) => e,
                None => continue,
            };
            if !(entry.use_optimization || entry.use_risk_management) {
                continue;
            }
            for (symbol, qty) in targets.iter_mut() {
                let mut factor = 1.0;
                if entry.use_optimization {
                    factor *= symbol_ratio.get(symbol).copied().unwrap_or(1.0);
                }
                if entry.use_risk_management {
                    factor *= uniform_scale;
                }
                if (factor - 1.0).abs() > f64::EPSILON {
                    *qty = Decimal::from_f64(qty.as_f64() * factor);
                }
            }
        }
    }

    fn plain_returns_history(&self) -> BTreeMap<String, Vec<f64>> {
        self.returns_history.iter().map(|(s, v)| (s.clone(), v.iter().copied().collect())).collect()
    }

    pub fn get_portfolio_positions(&self) -> BTreeMap<String, Position> {
        let mut agg: BTreeMap<String, Position> = BTreeMap::new();
        for entry in self.strategies.values() {
            for (symbol, pos) in entry.strategy.get_positions() {
                let slot = agg
                    .entry(symbol.clone())
                    .or_insert_with(|| Position::flat(symbol.clone(), pos.last_update));
                let total_qty = slot.quantity + pos.quantity;
                if !total_qty.is_zero() {
                    slot.average_price =
                        (slot.quantity * slot.average_price + pos.quantity * pos.average_price) / total_qty;
                }
                slot.quantity = total_qty;
                slot.unrealized_pnl = slot.unrealized_pnl + pos.unrealized_pnl;
                slot.realized_pnl = slot.realized_pnl + pos.realized_pnl;
                if pos.last_update > slot.last_update {
                    slot.last_update = pos.last_update;
                }
            }
        }
        agg
    }

    pub fn get_strategy_positions(&self, id: &str) -> Option<&BTreeMap<String, Position>> {
        self.strategies.get(id).map(|e| e.strategy.get_positions())
    }

    pub fn get_strategy_executions(&self, id: &str) -> &[ExecutionReport] {
        self.strategy_executions.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn get_recent_executions(&self) -> &[ExecutionReport] {
        &self.recent_executions
    }

    /// Drain and return the queue, for a caller (the coordinator) to reprice
    /// and dispatch.
    pub fn take_recent_executions(&mut self) -> Vec<ExecutionReport> {
        std::mem::take(&mut self.recent_executions)
    }

    pub fn clear_execution_history(&mut self, id: &str) {
        self.strategy_executions.remove(id);
        self.recent_executions.retain(|e| e.strategy_id != id);
    }

    pub fn clear_all_executions(&mut self) {
        self.strategy_executions.clear();
        self.recent_executions.clear();
    }

    /// Forward a priced execution to the strategy that generated it.
    pub fn dispatch_execution(&mut self, exec: &ExecutionReport) {
        if let Some(entry) = self.strategies.get_mut(&exec.strategy_id) {
            entry.strategy.on_execution(&ExecutionFeedback {
                symbol: exec.symbol.clone(),
                side_is_buy: exec.side == Side::Buy,
                filled_quantity: exec.filled_quantity,
                fill_price: exec.fill_price,
                fill_time: exec.fill_time,
            });
        } else {
            tracing::warn!(strategy_id = %exec.strategy_id, "execution dispatched to unknown strategy");
        }
    }

    /// Write-through used by the coordinator to record a day's
    /// mark-to-market PnL against one strategy's position.
    pub fn update_strategy_position(
        &mut self,
        strategy_id: &str,
        symbol: &str,
        daily_pnl: Decimal,
        at: Timestamp,
    ) -> Result<(), EngineError> {
        let entry = self.strategies.get_mut(strategy_id).ok_or_else(|| {
            EngineError::new(
                ErrorCode::InvalidArgument,
                format!("unknown strategy '{strategy_id}'"),
                "qtx-portfolio::PortfolioManager::update_strategy_position",
            )
        })?;
        entry.strategy.apply_daily_pnl(symbol, daily_pnl, at);
        Ok(())
    }

    /// Full-portfolio risk snapshot across every held position, regardless
    /// of which strategies opted into risk management — used by the
    /// coordinator purely for logging/visibility (§4.10 step "log it").
    pub fn evaluate_risk(&self, bars: &BTreeMap<String, Bar>) -> RiskResult {
        let positions = self.get_portfolio_positions();
        let qty_map: BTreeMap<String, Decimal> = positions.iter().map(|(s, p)| (s.clone(), p.quantity)).collect();
        let plain_returns = self.plain_returns_history();
        qtx_risk::RiskManager::evaluate(&qty_map, bars, &plain_returns, self.point_values, &self.config.risk_config)
    }
}

fn diff_to_executions(
    current: &BTreeMap<String, Decimal>,
    target: &BTreeMap<String, Decimal>,
    previous_close_prices: &BTreeMap<String, Decimal>,
    today_bars: &[Bar],
    stamp: Timestamp,
    strategy_id: &str,
    sequence: &mut u64,
) -> Vec<ExecutionReport> {
    let mut symbols: BTreeSet<String> = BTreeSet::new();
    symbols.extend(current.keys().cloned());
    symbols.extend(target.keys().cloned());

    let fallback: BTreeMap<String, Decimal> = today_bars.iter().map(|b| (b.symbol.clone(), b.close)).collect();

    let mut reports = Vec::new();
    for symbol in symbols {
        let cur = current.get(&symbol).copied().unwrap_or(Decimal::ZERO);
        let tgt = target.get(&symbol).copied().unwrap_or(Decimal::ZERO);
        let delta = tgt - cur;
        if delta.abs().as_f64() < MIN_TRADE_DELTA {
            continue;
        }

        let price = match previous_close_prices.get(&symbol) {
            Some(p) => *p,
            None => match fallback.get(&symbol) {
                Some(p) => *p,
                None => continue,
            },
        };

        let side = if delta.is_negative() { Side::Sell } else { Side::Buy };
        *sequence += 1;
        let ts_ms = stamp.timestamp_millis();
        reports.push(ExecutionReport {
            order_id: format!("PORD-{ts_ms}-{sequence}"),
            exec_id: format!("PEXE-{ts_ms}-{sequence}"),
            symbol,
            side,
            filled_quantity: delta.abs(),
            fill_price: price,
            fill_time: stamp,
            commission: Decimal::ZERO,
            is_partial: false,
            strategy_id: strategy_id.to_string(),
        });
    }
    reports
}

/// Sample covariance of each symbol pair's returns over the trailing
/// `lookback_days` window. A pair with fewer than two overlapping
/// observations falls back to the identity (1.0 on the diagonal, 0
/// off-diagonal) so the optimizer's Gauss-Seidel solve stays well-posed.
fn build_covariance(
    returns_history: &BTreeMap<String, VecDeque<f64>>,
    lookback_days: usize,
) -> qtx_optimizer::Covariance {
    let symbols: Vec<&String> = returns_history.keys().collect();
    let mut cov = qtx_optimizer::Covariance::new();
    for &a in &symbols {
        let mut row = BTreeMap::new();
        for &b in &symbols {
            let sa = tail(&returns_history[a], lookback_days);
            let sb = tail(&returns_history[b], lookback_days);
            let n = sa.len().min(sb.len());
            if n < 2 {
                row.insert(b.clone(), if a == b { 1.0 } else { 0.0 });
                continue;
            }
            let sa = &sa[sa.len() - n..];
            let sb = &sb[sb.len() - n..];
            let ma = sa.iter().sum::<f64>() / n as f64;
            let mb = sb.iter().sum::<f64>() / n as f64;
            let c = sa.iter().zip(sb.iter()).map(|(x, y)| (x - ma) * (y - mb)).sum::<f64>() / (n as f64 - 1.0);
            row.insert(b.clone(), c);
        }
        cov.insert(a.clone(), row);
    }
    cov
}

fn tail(v: &VecDeque<f64>, n: usize) -> Vec<f64> {
    let len = v.len();
    let start = len.saturating_sub(n.max(1));
    v.iter().skip(start).copied().collect()
}
