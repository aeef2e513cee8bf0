use std::collections::BTreeMap;

use qtx_core::Decimal;

/// Dense symbol-by-symbol covariance matrix, row-major via nested maps so
/// lookups stay deterministic regardless of insertion order.
pub type Covariance = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Clone, Debug, PartialEq)]
pub struct OptimizationResult {
    pub positions: BTreeMap<String, Decimal>,
    pub tracking_error: f64,
    pub objective: f64,
    pub iterations: u32,
    pub converged: bool,
}
