use std::collections::BTreeMap;

use qtx_core::{AssetClass, Decimal, Frequency};
use serde::{Deserialize, Serialize};

/// Per-symbol cost model feeding the execution manager's commission formula.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SymbolCosts {
    pub commission_rate: Decimal,
    pub fixed_commission: Decimal,
}

impl Default for SymbolCosts {
    fn default() -> Self {
        Self {
            commission_rate: Decimal::from_f64(0.0005),
            fixed_commission: Decimal::from_f64(1.0),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct StrategyFlags {
    pub save_positions: bool,
    pub save_signals: bool,
    pub save_executions: bool,
}

/// Strategy-level configuration (§3 StrategyConfig).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub capital_allocation: Decimal,
    pub asset_classes: Vec<AssetClass>,
    pub frequencies: Vec<Frequency>,
    pub max_leverage: f64,
    pub max_drawdown: f64,
    pub position_limits: BTreeMap<String, Decimal>,
    pub trading_params: BTreeMap<String, Decimal>,
    pub costs: BTreeMap<String, SymbolCosts>,
    pub flags: StrategyFlags,
}

impl StrategyConfig {
    pub fn point_value(&self, symbol: &str) -> Decimal {
        *self
            .trading_params
            .get(symbol)
            .unwrap_or(&Decimal::ONE)
    }
}

/// Dynamic-optimiser configuration (§4.8).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptConfig {
    pub use_optimization: bool,
    pub cost_penalty: f64,
    pub asymmetric_risk_buffer: f64,
    pub max_iterations: u32,
    pub convergence_threshold: f64,
    pub use_buffering: bool,
    pub buffer_size_factor: f64,
}

impl Default for OptConfig {
    fn default() -> Self {
        Self {
            use_optimization: false,
            cost_penalty: 10.0,
            asymmetric_risk_buffer: 1.0,
            max_iterations: 100,
            convergence_threshold: 1e-6,
            use_buffering: true,
            buffer_size_factor: 0.1,
        }
    }
}

/// Risk-manager configuration (§4.9).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    pub capital: Decimal,
    pub var_confidence: f64,
    pub lookback_days: usize,
    pub var_limit: f64,
    pub jump_risk_limit: f64,
    pub max_correlation: f64,
    pub max_gross_leverage: f64,
    pub max_net_leverage: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            capital: Decimal::from_f64(1_000_000.0),
            var_confidence: 0.95,
            lookback_days: 252,
            var_limit: 0.05,
            jump_risk_limit: 0.10,
            max_correlation: 0.7,
            max_gross_leverage: 4.0,
            max_net_leverage: 2.0,
        }
    }
}

/// Portfolio-level configuration (§4.7 PortfolioConfig).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    pub total_capital: Decimal,
    pub reserve_capital: Decimal,
    pub max_strategy_allocation: f64,
    pub min_strategy_allocation: f64,
    pub use_optimization: bool,
    pub use_risk_management: bool,
    pub opt_config: OptConfig,
    pub risk_config: RiskConfig,
    pub version: String,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            total_capital: Decimal::from_f64(1_000_000.0),
            reserve_capital: Decimal::ZERO,
            max_strategy_allocation: 1.0,
            min_strategy_allocation: 0.0,
            use_optimization: false,
            use_risk_management: false,
            opt_config: OptConfig::default(),
            risk_config: RiskConfig::default(),
            version: "1.0.0".to_string(),
        }
    }
}

/// Top-level backtest configuration (§3 BacktestConfig).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub strategy_config: StrategyConfig,
    pub portfolio_config: PortfolioConfig,
    pub portfolio_id: String,
    pub slippage_bps: f64,
    pub commission_rate: Decimal,
    pub warmup_days: usize,
    pub store_trade_details: bool,
}
