//! Pure metrics computation (§4.10.1). Everything here is a function of an
//! equity curve and an execution tape; no IO, no mutable state carried
//! between calls.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use qtx_core::{Decimal, ExecutionReport, Side, Timestamp};

use crate::types::{BacktestResults, TradeStats};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;
const SORTINO_CAP: f64 = 999.0;

pub fn daily_returns(equity_curve: &[(Timestamp, Decimal)]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .filter_map(|w| {
            let prev = w[0].1.as_f64();
            let curr = w[1].1.as_f64();
            if prev.abs() > f64::EPSILON {
                Some((curr - prev) / prev)
            } else {
                None
            }
        })
        .collect()
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn stdev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let var = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

pub fn total_return(equity_curve: &[(Timestamp, Decimal)]) -> f64 {
    let (Some(first), Some(last)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    let first_eq = first.1.as_f64();
    if first_eq.abs() <= f64::EPSILON {
        return 0.0;
    }
    (last.1.as_f64() - first_eq) / first_eq
}

pub fn volatility(returns: &[f64]) -> f64 {
    stdev(returns) * TRADING_DAYS_PER_YEAR.sqrt()
}

pub fn sharpe(returns: &[f64], volatility: f64) -> f64 {
    if volatility > 0.0 {
        mean(returns) * TRADING_DAYS_PER_YEAR / volatility
    } else {
        0.0
    }
}

/// Downside deviation: RMS of the negative returns only, annualised.
pub fn downside_vol(returns: &[f64]) -> f64 {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    if downside.is_empty() {
        return 0.0;
    }
    let mean_sq = downside.iter().map(|r| r.powi(2)).sum::<f64>() / downside.len() as f64;
    mean_sq.sqrt() * TRADING_DAYS_PER_YEAR.sqrt()
}

pub fn sortino(returns: &[f64], downside_vol: f64) -> f64 {
    let annual_mean = mean(returns) * TRADING_DAYS_PER_YEAR;
    if downside_vol > 0.0 {
        annual_mean / downside_vol
    } else if annual_mean >= 0.0 {
        SORTINO_CAP
    } else {
        0.0
    }
}

pub fn max_drawdown(equity_curve: &[(Timestamp, Decimal)]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0_f64;
    for (_, equity) in equity_curve {
        let e = equity.as_f64();
        if e > peak {
            peak = e;
        }
        if peak > 0.0 && e < peak {
            worst = worst.max((peak - e) / peak);
        }
    }
    worst
}

pub fn calmar(total_return: f64, max_drawdown: f64) -> f64 {
    if max_drawdown > 0.0 {
        total_return / max_drawdown
    } else {
        0.0
    }
}

/// `VaR95 = -r_{floor(0.05*N)}` over ascending-sorted returns;
/// `CVaR95 = -mean(r_j for j <= var_index)`.
pub fn var_cvar_95(returns: &[f64]) -> (f64, f64) {
    if returns.is_empty() {
        return (0.0, 0.0);
    }
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = ((0.05 * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    let var95 = -sorted[idx];
    let cvar95 = -mean(&sorted[..=idx]);
    (var95, cvar95)
}

/// `beta = cov(r, bench) / var(bench)`; `correlation` is Pearson's over the
/// overlapping length. Both default to 0.0 with no benchmark supplied.
pub fn beta_correlation(returns: &[f64], benchmark: Option<&[f64]>) -> (f64, f64) {
    let Some(bench) = benchmark else {
        return (0.0, 0.0);
    };
    let n = returns.len().min(bench.len());
    if n < 2 {
        return (0.0, 0.0);
    }
    let r = &returns[returns.len() - n..];
    let b = &bench[bench.len() - n..];
    let mean_r = mean(r);
    let mean_b = mean(b);
    let mut cov = 0.0;
    let mut var_b = 0.0;
    let mut var_r = 0.0;
    for i in 0..n {
        let dr = r[i] - mean_r;
        let db = b[i] - mean_b;
        cov += dr * db;
        var_b += db * db;
        var_r += dr * dr;
    }
    let beta = if var_b > f64::EPSILON { cov / var_b } else { 0.0 };
    let correlation = if var_b > f64::EPSILON && var_r > f64::EPSILON {
        cov / (var_r.sqrt() * var_b.sqrt())
    } else {
        0.0
    };
    (beta, correlation)
}

pub fn monthly_returns(equity_curve: &[(Timestamp, Decimal)]) -> BTreeMap<(i32, u32), f64> {
    let mut last_of_month: BTreeMap<(i32, u32), Decimal> = BTreeMap::new();
    for (ts, equity) in equity_curve {
        let key = (ts.year(), ts.month());
        last_of_month.insert(key, *equity);
    }
    let mut months: Vec<((i32, u32), Decimal)> = last_of_month.into_iter().collect();
    months.sort_by_key(|(k, _)| *k);

    let mut out = BTreeMap::new();
    for window in months.windows(2) {
        let (key, curr) = window[1];
        let (_, prev) = window[0];
        let prev_f = prev.as_f64();
        if prev_f.abs() > f64::EPSILON {
            out.insert(key, (curr.as_f64() - prev_f) / prev_f);
        }
    }
    out
}

/// Walk `executions` (already sorted by `fill_time`) maintaining one
/// running signed position and average price per symbol across the whole
/// portfolio's tape. Whenever a fill reduces or flips a symbol's sign, the
/// closed portion becomes a realised trade: `pnl = closed_qty * (fill_price
/// - avg_price) * sign - commission`. Mirrors the average-price fill
/// accounting `StrategyCore::on_execution` uses, extended with open/close
/// timestamps for holding-period reporting.
pub fn trade_stats(executions: &[ExecutionReport]) -> TradeStats {
    struct Open {
        qty: Decimal,
        avg_price: Decimal,
        opened_at: Timestamp,
    }

    let mut book: BTreeMap<String, Open> = BTreeMap::new();
    let mut stats = TradeStats::default();

    for exec in executions {
        let signed = match exec.side {
            Side::Buy => exec.filled_quantity,
            Side::Sell => -exec.filled_quantity,
        };

        let entry = book.entry(exec.symbol.clone()).or_insert_with(|| Open {
            qty: Decimal::ZERO,
            avg_price: Decimal::ZERO,
            opened_at: exec.fill_time,
        });

        let old_qty = entry.qty;
        let new_qty = old_qty + signed;
        let same_direction_or_flat = old_qty.is_zero() || (old_qty.is_negative() == signed.is_negative());

        if same_direction_or_flat {
            let old_abs = old_qty.abs();
            let new_abs = new_qty.abs();
            if !new_abs.is_zero() {
                entry.avg_price = (old_abs * entry.avg_price + exec.filled_quantity * exec.fill_price) / new_abs;
            }
            if old_qty.is_zero() {
                entry.opened_at = exec.fill_time;
            }
        } else {
            let closed_qty = old_qty.abs().min(exec.filled_quantity);
            let sign = if old_qty.is_negative() { -Decimal::ONE } else { Decimal::ONE };
            let pnl = closed_qty * (exec.fill_price - entry.avg_price) * sign - exec.commission;

            stats.total_trades += 1;
            if pnl > Decimal::ZERO {
                stats.winning_trades += 1;
                stats.total_profit = stats.total_profit + pnl;
                stats.max_win = stats.max_win.max(pnl);
            } else {
                stats.total_loss = stats.total_loss + pnl.abs();
                stats.max_loss = stats.max_loss.max(pnl.abs());
            }
            stats.holding_days_sum += (exec.fill_time - entry.opened_at).num_days();

            if new_qty.signum() != 0 && new_qty.signum() != old_qty.signum() {
                entry.avg_price = exec.fill_price;
                entry.opened_at = exec.fill_time;
            }
        }

        entry.qty = new_qty;
    }

    stats
}

/// Assemble every §4.10.1 figure into a `BacktestResults`.
pub fn compute(
    equity_curve: Vec<(Timestamp, Decimal)>,
    mut executions: Vec<ExecutionReport>,
    symbol_pnl: BTreeMap<String, Decimal>,
    daily_positions: Vec<(NaiveDate, Vec<qtx_core::Position>)>,
    warmup_days: usize,
    benchmark_returns: Option<&[f64]>,
) -> BacktestResults {
    executions.sort_by_key(|e| e.fill_time);

    let returns = daily_returns(&equity_curve);
    let vol = volatility(&returns);
    let dd = max_drawdown(&equity_curve);
    let tr = total_return(&equity_curve);
    let downside = downside_vol(&returns);
    let (var95, cvar95) = var_cvar_95(&returns);
    let (beta, correlation) = beta_correlation(&returns, benchmark_returns);
    let stats = trade_stats(&executions);

    let winners = stats.winning_trades;
    let total = stats.total_trades;
    let losers = total - winners;

    let win_rate = if total > 0 { winners as f64 / total as f64 } else { 0.0 };
    let avg_win = if winners > 0 {
        stats.total_profit / Decimal::from_f64(winners as f64)
    } else {
        Decimal::ZERO
    };
    let avg_loss = if losers > 0 {
        stats.total_loss / Decimal::from_f64(losers as f64)
    } else {
        Decimal::ZERO
    };
    let profit_factor = if !stats.total_loss.is_zero() {
        (stats.total_profit / stats.total_loss).as_f64()
    } else if !stats.total_profit.is_zero() {
        999.0
    } else {
        0.0
    };
    let avg_holding_period = if total > 0 { stats.holding_days_sum as f64 / total as f64 } else { 0.0 };

    BacktestResults {
        equity_curve,
        executions,
        daily_positions,
        symbol_pnl,
        warmup_days,
        total_return: tr,
        volatility: vol,
        sharpe: sharpe(&returns, vol),
        sortino: sortino(&returns, downside),
        max_drawdown: dd,
        calmar: calmar(tr, dd),
        var_95: var95,
        cvar_95: cvar95,
        beta,
        correlation,
        downside_vol: downside,
        avg_holding_period,
        win_rate,
        profit_factor,
        avg_win,
        avg_loss,
        max_win: stats.max_win,
        max_loss: stats.max_loss,
        winning_trades: winners,
        total_trades: total,
        monthly_returns: monthly_returns(&equity_curve),
    }
}
