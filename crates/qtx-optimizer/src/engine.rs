//! Dynamic optimizer (C8): nudges raw strategy-combined target positions
//! toward a risk- and cost-aware trade list via Gauss-Seidel coordinate
//! descent on a quadratic tracking-error objective with an L1 transaction
//! cost penalty, solved per-symbol by soft-thresholding (the standard
//! proximal operator for an L1-penalized quadratic).

use std::collections::{BTreeMap, BTreeSet};

use qtx_config::OptConfig;
use qtx_core::Decimal;

use crate::types::{Covariance, OptimizationResult};

pub struct Optimizer {
    pub config: OptConfig,
}

impl Optimizer {
    pub fn new(config: OptConfig) -> Self {
        Self { config }
    }

    fn cov(matrix: &Covariance, a: &str, b: &str) -> f64 {
        matrix.get(a).and_then(|row| row.get(b)).copied().unwrap_or(if a == b { 1.0 } else { 0.0 })
    }

    /// `current`: today's starting positions. `target`: the unconstrained
    /// ideal (e.g. the sum of per-strategy target positions). `costs`:
    /// per-symbol marginal trading cost used by the L1 penalty. `weights`:
    /// currently unused beyond validating symbol coverage — reserved for a
    /// future per-symbol objective weighting scheme.
    pub fn optimize(
        &self,
        current: &BTreeMap<String, Decimal>,
        target: &BTreeMap<String, Decimal>,
        costs: &BTreeMap<String, f64>,
        _weights: &BTreeMap<String, f64>,
        covariance: &Covariance,
    ) -> OptimizationResult {
        let mut symbols: BTreeSet<String> = BTreeSet::new();
        symbols.extend(current.keys().cloned());
        symbols.extend(target.keys().cloned());

        let get = |m: &BTreeMap<String, Decimal>, s: &str| m.get(s).copied().unwrap_or(Decimal::ZERO).as_f64();
        let target_f: BTreeMap<String, f64> = symbols.iter().map(|s| (s.clone(), get(target, s))).collect();
        let current_f: BTreeMap<String, f64> = symbols.iter().map(|s| (s.clone(), get(current, s))).collect();

        if !self.config.use_optimization {
            return OptimizationResult {
                positions: target.clone(),
                tracking_error: 0.0,
                objective: 0.0,
                iterations: 0,
                converged: true,
            };
        }

        let mut x: BTreeMap<String, f64> = current_f.clone();
        let mut iterations = 0;
        let mut converged = false;

        for _ in 0..self.config.max_iterations.max(1) {
            iterations += 1;
            let mut max_move: f64 = 0.0;

            for symbol in &symbols {
                let sigma_ii = Self::cov(covariance, symbol, symbol).max(1e-12);
                let cross: f64 = symbols
                    .iter()
                    .filter(|other| *other != symbol)
                    .map(|other| Self::cov(covariance, symbol, other) * (x[other] - target_f[other]))
                    .sum();

                let unconstrained = target_f[symbol] - cross / sigma_ii;

                let cost_i = costs.get(symbol).copied().unwrap_or(0.0);
                let base_threshold = self.config.cost_penalty * cost_i / (2.0 * sigma_ii);

                let current_i = current_f[symbol];
                let delta = unconstrained - current_i;

                let increases_risk = unconstrained.abs() > current_i.abs();
                let threshold = if increases_risk {
                    base_threshold
                } else {
                    base_threshold * self.config.asymmetric_risk_buffer
                };

                let new_x = if delta.abs() <= threshold {
                    current_i
                } else {
                    current_i + delta - delta.signum() * threshold
                };

                let prev = x[symbol];
                max_move = max_move.max((new_x - prev).abs());
                x.insert(symbol.clone(), new_x);
            }

            if max_move < self.config.convergence_threshold {
                converged = true;
                break;
            }
        }

        if self.config.use_buffering {
            for symbol in &symbols {
                let raw = x[symbol];
                let width = self.config.buffer_size_factor * raw.abs();
                let cur = current_f[symbol];
                let snapped = if cur < raw - width {
                    raw - width
                } else if cur > raw + width {
                    raw + width
                } else {
                    cur
                };
                x.insert(symbol.clone(), snapped.round());
            }
        }

        let dev: BTreeMap<String, f64> = symbols.iter().map(|s| (s.clone(), x[s] - target_f[s])).collect();
        let tracking_error = Self::quadratic_form(&dev, covariance);

        let transaction_cost: f64 = symbols
            .iter()
            .map(|s| costs.get(s).copied().unwrap_or(0.0) * (x[s] - current_f[s]).abs())
            .sum();
        let objective = tracking_error + self.config.cost_penalty * transaction_cost;

        let positions: BTreeMap<String, Decimal> =
            symbols.iter().map(|s| (s.clone(), Decimal::from_f64(x[s]))).collect();

        OptimizationResult {
            positions,
            tracking_error,
            objective,
            iterations,
            converged,
        }
    }

    fn quadratic_form(dev: &BTreeMap<String, f64>, covariance: &Covariance) -> f64 {
        let mut total = 0.0;
        for (a, &da) in dev {
            for (b, &db) in dev {
                total += da * db * Self::cov(covariance, a, b);
            }
        }
        total.max(0.0).sqrt()
    }
}
