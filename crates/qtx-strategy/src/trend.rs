//! Reference trend-following strategy: multi-timeframe EMA crossover
//! forecasts, blended rolling-window volatility, a volatility-regime
//! multiplier, and forecast-diversification-adjusted position sizing with
//! optional buffering. Ported from a production strategy's sizing logic,
//! not reinvented — the formulas below are load-bearing, not illustrative.

use std::collections::BTreeMap;

use qtx_core::{Bar, Decimal, EngineError, Position, Timestamp};
use qtx_config::StrategyConfig;

use crate::base::StrategyCore;
use crate::types::{ExecutionFeedback, RiskCheckResult, RiskLimits, StrategyMetadata, StrategyMetrics, StrategyState};
use crate::r#trait::Strategy;

/// One EMA crossover pair, e.g. (8, 32) or (16, 64).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrendRule {
    pub fast_span: usize,
    pub slow_span: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TrendFollowingConfig {
    pub rules: Vec<TrendRule>,
    pub vol_short_window: usize,
    pub vol_long_window: usize,
    pub vol_regime_window_days: usize,
    pub capital_allocation: Decimal,
    pub idm: f64,
    pub risk_target: f64,
    pub contract_size: Decimal,
    pub fx_rate: Decimal,
    pub use_buffering: bool,
    pub buffer_fraction: f64,
}

impl Default for TrendFollowingConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                TrendRule { fast_span: 8, slow_span: 32 },
                TrendRule { fast_span: 16, slow_span: 64 },
                TrendRule { fast_span: 32, slow_span: 128 },
            ],
            vol_short_window: 22,
            vol_long_window: 252 * 10,
            vol_regime_window_days: 252 * 10,
            capital_allocation: Decimal::from_f64(1_000_000.0),
            idm: 1.5,
            risk_target: 0.2,
            contract_size: Decimal::ONE,
            fx_rate: Decimal::ONE,
            use_buffering: true,
            buffer_fraction: 0.1,
        }
    }
}

impl TrendFollowingConfig {
    /// Build sizing parameters from a strategy's loaded `trading_params`,
    /// falling back to the struct defaults for any key that's absent. Known
    /// keys: `idm`, `risk_target`, `contract_size`, `fx_rate`,
    /// `buffer_fraction`.
    pub fn from_strategy_config(cfg: &StrategyConfig) -> Self {
        let default = Self::default();
        let param = |key: &str, fallback: f64| -> f64 {
            cfg.trading_params.get(key).map(|d| d.as_f64()).unwrap_or(fallback)
        };
        Self {
            capital_allocation: cfg.capital_allocation,
            idm: param("idm", default.idm),
            risk_target: param("risk_target", default.risk_target),
            contract_size: Decimal::from_f64(param("contract_size", default.contract_size.as_f64())),
            fx_rate: Decimal::from_f64(param("fx_rate", default.fx_rate.as_f64())),
            buffer_fraction: param("buffer_fraction", default.buffer_fraction),
            ..default
        }
    }
}

/// Forecast diversification multiplier keyed by the number of rules
/// combined. Values rise sub-linearly with rule count since correlated
/// crossover pairs add less diversification than independent signals would.
fn fdm_for_rule_count(n: usize) -> f64 {
    match n {
        0 => 1.0,
        1 => 1.0,
        2 => 1.03,
        3 => 1.08,
        4 => 1.13,
        5 => 1.19,
        6 => 1.26,
        _ => 1.26 + 0.02 * (n as f64 - 6.0),
    }
}

fn ema_series(values: &[f64], span: usize) -> Vec<f64> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = values[0];
    out.push(prev);
    for &v in &values[1..] {
        prev = alpha * v + (1.0 - alpha) * prev;
        out.push(prev);
    }
    out
}

fn mean(xs: &[f64]) -> f64 {
    xs.iter().sum::<f64>() / xs.len() as f64
}

fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64
}

fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
}

/// Blended rolling-window volatility: 70% short-window variance, 30%
/// adaptive-long-window variance, blended under the square root and
/// annualized by sqrt(252). Requires at least 252 closes; returns `None`
/// otherwise.
pub fn calculate_volatility(closes: &[f64], short_window: usize, long_window_cfg: usize) -> Option<f64> {
    if closes.len() < 252 {
        return None;
    }
    let returns = log_returns(closes);
    if returns.len() < short_window {
        return None;
    }

    let short = &returns[returns.len() - short_window..];
    let short_var = variance(short);

    let long_window = long_window_cfg.max(252).min(returns.len());
    let long = &returns[returns.len() - long_window..];
    let long_var = variance(long);

    Some((0.7 * short_var + 0.3 * long_var).sqrt() * 252.0_f64.sqrt())
}

/// A single EMA-crossover forecast: the fast-minus-slow EMA spread,
/// normalized by price and volatility, rescaled so the realized mean
/// absolute value of the rule's own forecast series is 10, then clipped to
/// +/-20.
pub fn get_single_scaled_forecast(closes: &[f64], rule: TrendRule, volatility: f64) -> Option<f64> {
    if closes.len() < rule.slow_span || volatility <= 0.0 {
        return None;
    }
    let fast = ema_series(closes, rule.fast_span);
    let slow = ema_series(closes, rule.slow_span);

    // Realized raw-forecast series from the first bar the slow EMA is
    // defined over, normalized by price and volatility at each point.
    let start = rule.slow_span - 1;
    let raw_series: Vec<f64> = (start..closes.len())
        .map(|i| (fast[i] - slow[i]) / closes[i] / volatility)
        .collect();
    if raw_series.is_empty() {
        return None;
    }

    let abs_avg = mean(&raw_series.iter().map(|x| x.abs()).collect::<Vec<_>>());
    if abs_avg == 0.0 {
        return Some(0.0);
    }
    let scaled = raw_series.last().unwrap() * (10.0 / abs_avg);
    Some(scaled.clamp(-20.0, 20.0))
}

/// Combine per-rule forecasts with the forecast diversification multiplier.
/// Intentionally requires every rule to have produced a valid forecast;
/// if any one is missing, there is no combined signal for this bar.
pub fn generate_raw_forecasts(closes: &[f64], rules: &[TrendRule], volatility: f64) -> Option<f64> {
    let mut forecasts = Vec::with_capacity(rules.len());
    for &rule in rules {
        match get_single_scaled_forecast(closes, rule, volatility) {
            Some(f) => forecasts.push(f),
            None => return None,
        }
    }
    if forecasts.is_empty() {
        return None;
    }
    let avg = mean(&forecasts);
    let fdm = fdm_for_rule_count(forecasts.len());
    Some((avg * fdm).clamp(-20.0, 20.0))
}

/// Quantile of `current` among `history`, in [0, 1]. Empty history returns
/// 0.5 (median assumption) rather than panicking.
fn quantile_rank(history: &[f64], current: f64) -> f64 {
    if history.is_empty() {
        return 0.5;
    }
    let below = history.iter().filter(|&&h| h <= current).count();
    (below as f64 / history.len() as f64).clamp(0.0, 1.0)
}

/// Volatility regime multiplier: quantile-ranks the current relative
/// volatility against up to ten years of history, maps the quantile to a
/// raw multiplier via `2 - 1.5*q`, then smooths with a 10-day EWMA of the
/// multiplier itself. Falls back to 2/3 when there isn't enough price
/// history (252 bars) or enough historical relative-vol observations (10)
/// to make the quantile meaningful.
pub fn calculate_vol_regime_multiplier(
    relative_vol_history: &[f64],
    current_relative_vol: f64,
    prev_smoothed_multiplier: Option<f64>,
    closes_len: usize,
) -> f64 {
    if closes_len < 252 || relative_vol_history.len() < 10 {
        return 2.0 / 3.0;
    }
    let q = quantile_rank(relative_vol_history, current_relative_vol);
    let raw = 2.0 - 1.5 * q;
    let alpha = 2.0 / (10.0 + 1.0);
    match prev_smoothed_multiplier {
        Some(prev) => alpha * raw + (1.0 - alpha) * prev,
        None => raw,
    }
}

/// Subsystem position sizing: forecast * capital_allocation * idm *
/// risk_target / (10 * contract_size * price * fx_rate * volatility).
pub fn calculate_position(
    forecast: f64,
    capital_allocation: f64,
    idm: f64,
    risk_target: f64,
    contract_size: f64,
    price: f64,
    fx_rate: f64,
    volatility: f64,
) -> f64 {
    if price <= 0.0 || volatility <= 0.0 || contract_size <= 0.0 || fx_rate <= 0.0 {
        return 0.0;
    }
    let numerator = forecast * capital_allocation * idm * risk_target;
    let denominator = 10.0 * contract_size * price * fx_rate * volatility;
    numerator / denominator
}

/// Buffer width is 10% of the same sizing formula's magnitude (using
/// forecast = 10, the "neutral" forecast level). The current position is
/// left unchanged if it already falls within `[raw - width, raw + width]`;
/// otherwise it is moved to the nearest edge of that band and rounded to
/// the nearest whole contract.
pub fn apply_position_buffer(
    raw_position: f64,
    current_position: f64,
    capital_allocation: f64,
    idm: f64,
    risk_target: f64,
    contract_size: f64,
    price: f64,
    fx_rate: f64,
    volatility: f64,
    buffer_fraction: f64,
) -> f64 {
    let neutral = calculate_position(10.0, capital_allocation, idm, risk_target, contract_size, price, fx_rate, volatility);
    let width = buffer_fraction * neutral.abs();
    let lower = raw_position - width;
    let upper = raw_position + width;
    let target = if current_position < lower {
        lower
    } else if current_position > upper {
        upper
    } else {
        return current_position.round();
    };
    target.round()
}

struct SymbolState {
    relative_vol_history: Vec<f64>,
    prev_vol_multiplier: Option<f64>,
}

pub struct TrendFollowingStrategy {
    core: StrategyCore,
    config: TrendFollowingConfig,
    symbol_state: BTreeMap<String, SymbolState>,
}

impl TrendFollowingStrategy {
    pub fn new(name: impl Into<String>, config: TrendFollowingConfig) -> Self {
        let capital = config.capital_allocation;
        Self {
            core: StrategyCore::new(name, capital),
            config,
            symbol_state: BTreeMap::new(),
        }
    }

    fn signal_for_symbol(&mut self, symbol: &str) -> Option<f64> {
        let closes = self.core.price_history.get(symbol)?.closes();
        let volatility = calculate_volatility(&closes, self.config.vol_short_window, self.config.vol_long_window)?;
        let forecast = generate_raw_forecasts(&closes, &self.config.rules, volatility)?;

        let state = self
            .symbol_state
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolState { relative_vol_history: Vec::new(), prev_vol_multiplier: None });

        // The regime multiplier ranks today's volatility against its own
        // trailing history rather than against a separately-tracked
        // long-run average, so `relative_vol` is just the blended vol level.
        let relative_vol = volatility;
        let multiplier = calculate_vol_regime_multiplier(
            &state.relative_vol_history,
            relative_vol,
            state.prev_vol_multiplier,
            closes.len(),
        );
        state.relative_vol_history.push(relative_vol);
        if state.relative_vol_history.len() > self.config.vol_regime_window_days {
            state.relative_vol_history.remove(0);
        }
        state.prev_vol_multiplier = Some(multiplier);

        let scaled_forecast = (forecast * multiplier).clamp(-20.0, 20.0);

        let price = *closes.last()?;
        let raw_position = calculate_position(
            scaled_forecast,
            self.config.capital_allocation.as_f64(),
            self.config.idm,
            self.config.risk_target,
            self.config.contract_size.as_f64(),
            price,
            self.config.fx_rate.as_f64(),
            volatility,
        );

        if self.config.use_buffering {
            let current = self
                .core
                .target_positions
                .get(symbol)
                .copied()
                .unwrap_or(Decimal::ZERO)
                .as_f64();
            Some(apply_position_buffer(
                raw_position,
                current,
                self.config.capital_allocation.as_f64(),
                self.config.idm,
                self.config.risk_target,
                self.config.contract_size.as_f64(),
                price,
                self.config.fx_rate.as_f64(),
                volatility,
                self.config.buffer_fraction,
            ))
        } else {
            Some(raw_position.round())
        }
    }
}

impl Strategy for TrendFollowingStrategy {
    fn start(&mut self) -> Result<(), EngineError> {
        self.core.start()
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        self.core.pause()
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        self.core.resume()
    }

    fn stop(&mut self) -> Result<(), EngineError> {
        self.core.stop()
    }

    fn get_state(&self) -> StrategyState {
        self.core.state
    }

    fn on_data(&mut self, bars: &[Bar]) -> Result<(), EngineError> {
        self.core.on_data(bars);
        Ok(())
    }

    fn on_execution(&mut self, fill: &ExecutionFeedback) {
        self.core.on_execution(fill);
    }

    fn on_signal(&mut self) -> Result<(), EngineError> {
        let symbols: Vec<String> = self.core.price_history.keys().cloned().collect();
        for symbol in symbols {
            if let Some(position) = self.signal_for_symbol(&symbol) {
                self.core.target_positions.insert(symbol, Decimal::from_f64(position));
            }
        }
        Ok(())
    }

    fn get_positions(&self) -> &std::collections::BTreeMap<String, Position> {
        self.core.get_positions()
    }

    fn get_target_positions(&self) -> &BTreeMap<String, Decimal> {
        &self.core.target_positions
    }

    fn apply_daily_pnl(&mut self, symbol: &str, daily_pnl: Decimal, at: Timestamp) {
        self.core.apply_daily_pnl(symbol, daily_pnl, at);
    }

    fn get_price_history_len(&self, symbol: &str) -> usize {
        self.core.price_history_len(symbol)
    }

    fn get_metrics(&self) -> &StrategyMetrics {
        &self.core.metrics
    }

    fn get_metadata(&self) -> &StrategyMetadata {
        &self.core.metadata
    }

    fn update_risk_limits(&mut self, limits: RiskLimits) {
        self.core.risk_limits = limits;
    }

    fn check_risk_limits(&self, point_value: &dyn Fn(&str) -> Decimal) -> RiskCheckResult {
        self.core.check_risk_limits(point_value)
    }

    fn set_backtest_mode(&mut self, enabled: bool) {
        self.core.backtest_mode = enabled;
    }

    fn get_max_required_lookback(&self) -> usize {
        let slowest = self.config.rules.iter().map(|r| r.slow_span).max().unwrap_or(0);
        slowest.max(self.config.vol_long_window.min(252 * 10)).max(252)
    }
}
