use std::collections::BTreeMap;

/// Output of one risk evaluation pass. `metrics` carries every measured
/// quantity (gross_leverage, net_leverage, var_95, jump_risk, correlation)
/// whether or not it breached, so a caller can log the full picture.
#[derive(Clone, Debug, PartialEq)]
pub struct RiskResult {
    pub metrics: BTreeMap<String, f64>,
    pub risk_exceeded: bool,
    pub recommended_scale: f64,
}

impl RiskResult {
    pub fn within_limits(metrics: BTreeMap<String, f64>) -> Self {
        Self {
            metrics,
            risk_exceeded: false,
            recommended_scale: 1.0,
        }
    }
}
