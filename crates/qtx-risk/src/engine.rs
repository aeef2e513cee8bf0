//! Risk manager (C9) — contract only. A pure function of current positions,
//! today's bars, each symbol's recent return history, and a `RiskConfig`:
//! checks gross/net leverage, a historical-simulation VaR, single-symbol
//! jump risk, and average pairwise correlation against their configured
//! limits, and reports the largest uniform scale-down that would bring every
//! breached metric back within limit.

use std::collections::BTreeMap;

use qtx_config::RiskConfig;
use qtx_core::{Bar, Decimal, PointValueSource};

use crate::types::RiskResult;

pub struct RiskManager;

impl RiskManager {
    /// `positions`: symbol -> signed quantity. `bars`: today's bar per
    /// symbol, used only for mark-to-market pricing. `returns_history`:
    /// symbol -> chronological daily returns, used for VaR/jump/correlation;
    /// a symbol absent or too short for a given check is simply excluded
    /// from it rather than failing the whole evaluation.
    pub fn evaluate(
        positions: &BTreeMap<String, Decimal>,
        bars: &BTreeMap<String, Bar>,
        returns_history: &BTreeMap<String, Vec<f64>>,
        point_values: &dyn PointValueSource,
        config: &RiskConfig,
    ) -> RiskResult {
        let capital = config.capital.as_f64();
        let mut metrics = BTreeMap::new();

        let mut notionals: BTreeMap<String, f64> = BTreeMap::new();
        let mut gross = 0.0_f64;
        let mut net = 0.0_f64;
        for (symbol, qty) in positions {
            if qty.is_zero() {
                continue;
            }
            let price = match bars.get(symbol) {
                Some(bar) => bar.close,
                None => continue,
            };
            let pv = point_values.point_value(symbol).unwrap_or(Decimal::ONE);
            let notional = (*qty * price * pv).as_f64();
            notionals.insert(symbol.clone(), notional);
            gross += notional.abs();
            net += notional;
        }

        let gross_leverage = if capital.abs() > f64::EPSILON { gross / capital } else { 0.0 };
        let net_leverage = if capital.abs() > f64::EPSILON { net.abs() / capital } else { 0.0 };
        metrics.insert("gross_leverage".to_string(), gross_leverage);
        metrics.insert("net_leverage".to_string(), net_leverage);

        let mut scale_candidates: Vec<f64> = Vec::new();
        let mut exceeded = false;

        if config.max_gross_leverage > 0.0 && gross_leverage > config.max_gross_leverage {
            exceeded = true;
            scale_candidates.push(config.max_gross_leverage / gross_leverage);
        }
        if config.max_net_leverage > 0.0 && net_leverage > config.max_net_leverage {
            exceeded = true;
            scale_candidates.push(config.max_net_leverage / net_leverage);
        }

        // Weight each symbol's return series by its share of gross notional
        // to build one portfolio return series, then take a historical VaR
        // off the left tail.
        let weights: BTreeMap<String, f64> = if gross.abs() > f64::EPSILON {
            notionals.iter().map(|(s, n)| (s.clone(), n / gross)).collect()
        } else {
            BTreeMap::new()
        };

        let portfolio_returns = combine_weighted_returns(&weights, returns_history, config.lookback_days);
        if portfolio_returns.len() >= 10 {
            let var_pct = historical_var(&portfolio_returns, config.var_confidence);
            let var_dollar_fraction = var_pct * gross_leverage;
            metrics.insert("var_95".to_string(), var_dollar_fraction);
            if config.var_limit > 0.0 && var_dollar_fraction > config.var_limit {
                exceeded = true;
                scale_candidates.push(config.var_limit / var_dollar_fraction);
            }
        }

        let jump = notionals
            .keys()
            .filter_map(|s| returns_history.get(s).and_then(|r| r.last()).map(|r| r.abs()))
            .fold(0.0_f64, f64::max);
        if jump > 0.0 {
            let jump_exposure = jump * gross_leverage;
            metrics.insert("jump_risk".to_string(), jump_exposure);
            if config.jump_risk_limit > 0.0 && jump_exposure > config.jump_risk_limit {
                exceeded = true;
                scale_candidates.push(config.jump_risk_limit / jump_exposure);
            }
        }

        let held_symbols: Vec<&String> = notionals.keys().collect();
        if let Some(avg_corr) = average_pairwise_correlation(&held_symbols, returns_history) {
            metrics.insert("correlation".to_string(), avg_corr);
            if config.max_correlation > 0.0 && avg_corr > config.max_correlation {
                exceeded = true;
                // Correlation is scale-invariant: shrinking every position
                // uniformly does not reduce co-movement risk, so there is no
                // scale factor that "fixes" this breach.
                scale_candidates.push(0.0);
            }
        }

        if !exceeded {
            return RiskResult::within_limits(metrics);
        }

        let recommended_scale = scale_candidates
            .into_iter()
            .fold(1.0_f64, f64::min)
            .clamp(0.0, 1.0);

        RiskResult {
            metrics,
            risk_exceeded: true,
            recommended_scale,
        }
    }
}

fn combine_weighted_returns(
    weights: &BTreeMap<String, f64>,
    returns_history: &BTreeMap<String, Vec<f64>>,
    lookback_days: usize,
) -> Vec<f64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let min_len = weights
        .keys()
        .filter_map(|s| returns_history.get(s).map(|r| r.len()))
        .min()
        .unwrap_or(0);
    let window = min_len.min(lookback_days.max(1));
    if window == 0 {
        return Vec::new();
    }
    (0..window)
        .map(|i| {
            weights
                .iter()
                .map(|(s, w)| {
                    let series = &returns_history[s];
                    w * series[series.len() - window + i]
                })
                .sum()
        })
        .collect()
}

/// Historical VaR at `confidence`: sort ascending, take the return at the
/// `(1 - confidence)` quantile, report its magnitude (positive = a loss).
fn historical_var(returns: &[f64], confidence: f64) -> f64 {
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let alpha = (1.0 - confidence).clamp(0.0, 1.0);
    let idx = ((alpha * sorted.len() as f64).floor() as usize).min(sorted.len() - 1);
    (-sorted[idx]).max(0.0)
}

fn pearson_correlation(a: &[f64], b: &[f64]) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let a = &a[a.len() - n..];
    let b = &b[b.len() - n..];
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..n {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a <= f64::EPSILON || var_b <= f64::EPSILON {
        return None;
    }
    Some(cov / (var_a.sqrt() * var_b.sqrt()))
}

fn average_pairwise_correlation(
    symbols: &[&String],
    returns_history: &BTreeMap<String, Vec<f64>>,
) -> Option<f64> {
    if symbols.len() < 2 {
        return None;
    }
    let mut total = 0.0;
    let mut count = 0usize;
    for i in 0..symbols.len() {
        for j in (i + 1)..symbols.len() {
            let a = returns_history.get(symbols[i])?;
            let b = returns_history.get(symbols[j]);
            if let Some(b) = b {
                if let Some(c) = pearson_correlation(a, b) {
                    total += c;
                    count += 1;
                }
            }
        }
    }
    if count == 0 {
        None
    } else {
        Some(total / count as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(symbol: &str, close: f64) -> Bar {
        Bar::new(
            symbol,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            Decimal::from_f64(close),
            Decimal::from_f64(close + 1.0),
            Decimal::from_f64(close - 1.0),
            Decimal::from_f64(close),
            Decimal::from_f64(1000.0),
        )
        .unwrap()
    }

    struct UnitPointValue;
    impl PointValueSource for UnitPointValue {
        fn point_value(&self, _symbol: &str) -> Option<Decimal> {
            Some(Decimal::ONE)
        }
    }

    #[test]
    fn within_limits_is_scale_one() {
        let mut positions = BTreeMap::new();
        positions.insert("AAA".to_string(), Decimal::from_f64(10.0));
        let mut bars = BTreeMap::new();
        bars.insert("AAA".to_string(), bar("AAA", 100.0));
        let cfg = RiskConfig::default();

        let result = RiskManager::evaluate(&positions, &bars, &BTreeMap::new(), &UnitPointValue, &cfg);
        assert!(!result.risk_exceeded);
        assert_eq!(result.recommended_scale, 1.0);
    }

    #[test]
    fn gross_leverage_breach_scales_down_proportionally() {
        // capital=1_000_000, max_gross_leverage=0.5, gross notional wants 2x
        // capital -> required scale = 0.5 / 2.0 = 0.25.
        let mut positions = BTreeMap::new();
        positions.insert("AAA".to_string(), Decimal::from_f64(20_000.0));
        let mut bars = BTreeMap::new();
        bars.insert("AAA".to_string(), bar("AAA", 100.0));
        let cfg = RiskConfig {
            capital: Decimal::from_f64(1_000_000.0),
            max_gross_leverage: 0.5,
            max_net_leverage: 100.0,
            var_limit: 0.0,
            jump_risk_limit: 0.0,
            max_correlation: 0.0,
            ..RiskConfig::default()
        };

        let result = RiskManager::evaluate(&positions, &bars, &BTreeMap::new(), &UnitPointValue, &cfg);
        assert!(result.risk_exceeded);
        assert!(result.recommended_scale <= 0.25 + 1e-9);
        assert!(result.recommended_scale > 0.0);
    }

    #[test]
    fn correlation_breach_cannot_be_fixed_by_scaling() {
        let mut positions = BTreeMap::new();
        positions.insert("AAA".to_string(), Decimal::from_f64(10.0));
        positions.insert("BBB".to_string(), Decimal::from_f64(10.0));
        let mut bars = BTreeMap::new();
        bars.insert("AAA".to_string(), bar("AAA", 100.0));
        bars.insert("BBB".to_string(), bar("BBB", 100.0));

        let series_a = vec![0.01, 0.02, -0.01, 0.015, -0.005, 0.03, -0.02, 0.01, 0.005, -0.01];
        let series_b = series_a.clone();
        let mut returns = BTreeMap::new();
        returns.insert("AAA".to_string(), series_a);
        returns.insert("BBB".to_string(), series_b);

        let cfg = RiskConfig {
            max_correlation: 0.5,
            max_gross_leverage: 100.0,
            max_net_leverage: 100.0,
            var_limit: 0.0,
            jump_risk_limit: 0.0,
            ..RiskConfig::default()
        };
        let result = RiskManager::evaluate(&positions, &bars, &returns, &UnitPointValue, &cfg);
        assert!(result.risk_exceeded);
        assert_eq!(result.recommended_scale, 0.0);
    }

    #[test]
    fn missing_bar_excludes_symbol_from_notional() {
        let mut positions = BTreeMap::new();
        positions.insert("AAA".to_string(), Decimal::from_f64(10.0));
        let cfg = RiskConfig::default();
        let result = RiskManager::evaluate(&positions, &BTreeMap::new(), &BTreeMap::new(), &UnitPointValue, &cfg);
        assert_eq!(result.metrics.get("gross_leverage"), Some(&0.0));
    }
}
