//! End-to-end day-loop scenarios (§8), exercised through
//! `BacktestCoordinator::run` + `PortfolioManager` + the reference
//! trend-following strategy, the same way the unit tests elsewhere in this
//! workspace exercise one component at a time.
//!
//! The 252-observation floor in `qtx-strategy`'s volatility calculation
//! (SPEC_FULL §4.6) means every scenario here needs at least a year of
//! daily bars before the strategy can produce its first forecast; the bar
//! counts below are sized for that rather than for the smaller illustrative
//! counts in the distilled spec text.

use std::collections::BTreeMap;

use chrono::{Duration, TimeZone, Utc};

use qtx_config::{BacktestConfig, PortfolioConfig, StrategyConfig, StrategyFlags};
use qtx_core::{Bar, Decimal, PointValueSource};
use qtx_backtest::BacktestCoordinator;
use qtx_portfolio::PortfolioManager;
use qtx_strategy::{Strategy, TrendFollowingConfig, TrendFollowingStrategy, TrendRule};

struct UnitPointValue;
impl PointValueSource for UnitPointValue {
    fn point_value(&self, _symbol: &str) -> Option<Decimal> {
        Some(Decimal::ONE)
    }
}

fn bar(symbol: &str, day: i64, close: f64) -> Bar {
    let ts = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::days(day);
    Bar::new(
        symbol,
        ts,
        Decimal::from_f64(close),
        Decimal::from_f64(close + 0.5),
        Decimal::from_f64(close - 0.5),
        Decimal::from_f64(close),
        Decimal::from_f64(10_000.0),
    )
    .unwrap()
}

fn strategy_config(capital: f64) -> StrategyConfig {
    StrategyConfig {
        capital_allocation: Decimal::from_f64(capital),
        asset_classes: Vec::new(),
        frequencies: Vec::new(),
        max_leverage: 2.0,
        max_drawdown: 0.2,
        position_limits: BTreeMap::new(),
        trading_params: BTreeMap::new(),
        costs: BTreeMap::new(),
        flags: StrategyFlags::default(),
    }
}

fn backtest_config(capital: f64) -> BacktestConfig {
    BacktestConfig {
        strategy_config: strategy_config(capital),
        portfolio_config: PortfolioConfig {
            total_capital: Decimal::from_f64(capital),
            ..PortfolioConfig::default()
        },
        portfolio_id: "p1".to_string(),
        slippage_bps: 0.0,
        commission_rate: Decimal::ZERO,
        warmup_days: 0,
        store_trade_details: false,
    }
}

/// Small rule set / short lookback windows so `get_max_required_lookback`
/// lands right at the 252-bar floor instead of the default ten-year one.
fn fast_trend_config(capital: f64, idm: f64, risk_target: f64) -> TrendFollowingConfig {
    TrendFollowingConfig {
        rules: vec![
            TrendRule { fast_span: 8, slow_span: 32 },
            TrendRule { fast_span: 16, slow_span: 64 },
        ],
        vol_short_window: 22,
        vol_long_window: 252,
        vol_regime_window_days: 252,
        capital_allocation: Decimal::from_f64(capital),
        idm,
        risk_target,
        contract_size: Decimal::ONE,
        fx_rate: Decimal::ONE,
        use_buffering: true,
        buffer_fraction: 0.1,
    }
}

fn started_strategy(name: &str, cfg: TrendFollowingConfig) -> Box<dyn Strategy + Send> {
    let mut s = TrendFollowingStrategy::new(name, cfg);
    s.start().unwrap();
    Box::new(s)
}

/// S1 — 300 bars of `close = 100 + 0.5*i`, single symbol. After the
/// 252-bar warmup the strategy should hold a long position, the equity
/// curve must be non-decreasing post-warmup, and the sharpe ratio should be
/// very high given the deterministic uptrend.
#[test]
fn s1_monotone_uptrend_accrues_long_position_and_high_sharpe() {
    let capital = 1_000_000.0;
    let bars: Vec<Bar> = (0..300).map(|i| bar("TRD", i, 100.0 + 0.5 * i as f64)).collect();

    let pv = UnitPointValue;
    let mut portfolio = PortfolioManager::new(PortfolioConfig {
        total_capital: Decimal::from_f64(capital),
        ..PortfolioConfig::default()
    }, &pv);
    let cfg = fast_trend_config(capital, 2.5, 0.2);
    portfolio.add_strategy("trend1", started_strategy("trend1", cfg), 1.0, false, false).unwrap();

    let mut coordinator = BacktestCoordinator::new(backtest_config(capital), &pv);
    let results = coordinator.run(&mut portfolio, bars, None).unwrap();

    let warmup = results.warmup_days;
    assert!(warmup > 0 && warmup < results.equity_curve.len());

    for w in results.equity_curve[warmup..].windows(2) {
        assert!(w[1].1 >= w[0].1, "equity curve must be non-decreasing post-warmup");
    }

    let final_positions = portfolio.get_portfolio_positions();
    let qty = final_positions.get("TRD").map(|p| p.quantity.as_f64()).unwrap_or(0.0);
    assert!(qty > 0.0, "expected an accrued long position, got {qty}");

    assert!(results.total_trades >= 1);
    assert!(results.sharpe > 3.0, "sharpe was {}", results.sharpe);
}

/// S2 — flat market: no symbol ever moves, so the blended volatility is
/// exactly zero and the strategy never produces a forecast. No executions,
/// a constant equity curve, and zeroed risk/return statistics follow.
#[test]
fn s2_flat_market_produces_no_trades() {
    let capital = 1_000_000.0;
    let bars: Vec<Bar> = (0..300).map(|i| bar("FLT", i, 100.0)).collect();

    let pv = UnitPointValue;
    let mut portfolio = PortfolioManager::new(PortfolioConfig {
        total_capital: Decimal::from_f64(capital),
        ..PortfolioConfig::default()
    }, &pv);
    let cfg = fast_trend_config(capital, 2.5, 0.2);
    portfolio.add_strategy("trend1", started_strategy("trend1", cfg), 1.0, false, false).unwrap();

    let mut coordinator = BacktestCoordinator::new(backtest_config(capital), &pv);
    let results = coordinator.run(&mut portfolio, bars, None).unwrap();

    assert_eq!(results.total_trades, 0);
    assert_eq!(results.max_drawdown, 0.0);
    assert_eq!(results.volatility, 0.0);
    assert_eq!(results.sharpe, 0.0);
    for w in results.equity_curve.windows(2) {
        assert_eq!(w[0].1, w[1].1);
    }
}

/// S3 — an uptrend long enough to clear warmup followed by a downtrend of
/// equal length. The strategy's target position should flip sign at least
/// once and the run should realize a drawdown.
#[test]
fn s3_regime_flip_produces_sign_change_and_drawdown() {
    let capital = 1_000_000.0;
    let up: Vec<Bar> = (0..280).map(|i| bar("REG", i, 100.0 + 0.5 * i as f64)).collect();
    let peak = 100.0 + 0.5 * 279.0;
    let down: Vec<Bar> = (0..280).map(|i| bar("REG", 280 + i, peak - 0.5 * i as f64)).collect();
    let bars: Vec<Bar> = up.into_iter().chain(down).collect();

    let pv = UnitPointValue;
    let mut portfolio = PortfolioManager::new(PortfolioConfig {
        total_capital: Decimal::from_f64(capital),
        ..PortfolioConfig::default()
    }, &pv);
    let cfg = fast_trend_config(capital, 2.5, 0.2);
    portfolio.add_strategy("trend1", started_strategy("trend1", cfg), 1.0, false, false).unwrap();

    let mut coordinator = BacktestCoordinator::new(backtest_config(capital), &pv);
    let results = coordinator.run(&mut portfolio, bars, None).unwrap();

    let mut saw_long = false;
    let mut saw_short = false;
    for exec in &results.executions {
        // Reconstruct running position sign from fill side; a simpler proxy
        // for "target sign changed" is that both buys and sells occurred
        // after the flip, since a pure uptrend would only ever buy.
        match exec.side {
            qtx_core::Side::Buy => saw_long = true,
            qtx_core::Side::Sell => saw_short = true,
        }
    }
    assert!(saw_long && saw_short, "expected both buy and sell executions across the regime flip");
    assert!(results.max_drawdown > 0.0);
    assert!(results.profit_factor.is_finite());
}

/// S5 — two strategies on the same symbol with a 0.7/0.3 allocation split.
/// The per-strategy executions must partition the aggregate, and the
/// aggregate's fill count/quantity is the union of both strategies' fills.
#[test]
fn s5_two_strategy_portfolio_attribution_sums_match() {
    let capital = 1_000_000.0;
    let bars: Vec<Bar> = (0..300).map(|i| bar("AAA", i, 100.0 + 0.3 * i as f64)).collect();

    let pv = UnitPointValue;
    let mut portfolio = PortfolioManager::new(PortfolioConfig {
        total_capital: Decimal::from_f64(capital),
        ..PortfolioConfig::default()
    }, &pv);

    let cfg_a = fast_trend_config(capital * 0.7, 2.5, 0.2);
    let cfg_b = fast_trend_config(capital * 0.3, 2.5, 0.2);
    portfolio.add_strategy("A", started_strategy("A", cfg_a), 0.7, false, false).unwrap();
    portfolio.add_strategy("B", started_strategy("B", cfg_b), 0.3, false, false).unwrap();

    let mut coordinator = BacktestCoordinator::new(backtest_config(capital), &pv);
    let results = coordinator.run(&mut portfolio, bars, None).unwrap();

    let exec_a = portfolio.get_strategy_executions("A");
    let exec_b = portfolio.get_strategy_executions("B");

    assert_eq!(exec_a.len() + exec_b.len(), results.executions.len());

    let mut from_strategies: Vec<String> = exec_a
        .iter()
        .chain(exec_b.iter())
        .map(|e| e.exec_id.clone())
        .collect();
    let mut from_aggregate: Vec<String> = results.executions.iter().map(|e| e.exec_id.clone()).collect();
    from_strategies.sort();
    from_aggregate.sort();
    assert_eq!(from_strategies, from_aggregate);
}
