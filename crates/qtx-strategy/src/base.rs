//! Shared strategy bookkeeping: lifecycle state machine, average-price
//! position accounting, and leverage/drawdown risk checks. Every concrete
//! strategy embeds one `StrategyCore` and delegates its lifecycle and
//! `on_execution`/`check_risk_limits` hooks to it, the same way the original
//! base class centralizes this logic for all of its subclasses.

use std::collections::BTreeMap;

use qtx_core::{Bar, Decimal, EngineError, ErrorCode, Position, Timestamp};

use crate::types::{
    lifecycle_transition_allowed, ExecutionFeedback, PositionBook, PriceHistory,
    PriceHistoryBook, RiskCheckResult, RiskLimits, StrategyMetadata, StrategyMetrics,
    StrategyState,
};

pub struct StrategyCore {
    pub state: StrategyState,
    pub positions: PositionBook,
    pub target_positions: BTreeMap<String, Decimal>,
    pub price_history: PriceHistoryBook,
    pub metrics: StrategyMetrics,
    pub metadata: StrategyMetadata,
    pub risk_limits: RiskLimits,
    pub capital_allocation: Decimal,
    pub backtest_mode: bool,
}

impl StrategyCore {
    pub fn new(name: impl Into<String>, capital_allocation: Decimal) -> Self {
        Self {
            state: StrategyState::Initialized,
            positions: BTreeMap::new(),
            target_positions: BTreeMap::new(),
            price_history: BTreeMap::new(),
            metrics: StrategyMetrics::default(),
            metadata: StrategyMetadata {
                name: name.into(),
                description: String::new(),
            },
            risk_limits: RiskLimits::default(),
            capital_allocation,
            backtest_mode: false,
        }
    }

    pub fn on_data(&mut self, bars: &[Bar]) {
        for bar in bars {
            self.price_history
                .entry(bar.symbol.clone())
                .or_insert_with(PriceHistory::default)
                .bars
                .push(bar.clone());
        }
    }

    pub fn price_history_len(&self, symbol: &str) -> usize {
        self.price_history.get(symbol).map(|h| h.bars.len()).unwrap_or(0)
    }

    pub fn transition(&mut self, to: StrategyState) -> Result<(), EngineError> {
        if !lifecycle_transition_allowed(self.state, to) {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                format!("invalid strategy transition {:?} -> {:?}", self.state, to),
                "qtx-strategy::StrategyCore::transition",
            ));
        }
        self.state = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), EngineError> {
        self.transition(StrategyState::Running)
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        self.transition(StrategyState::Paused)
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        self.transition(StrategyState::Running)
    }

    pub fn stop(&mut self) -> Result<(), EngineError> {
        self.transition(StrategyState::Stopped)
    }

    /// Average-price position update on a fill (§4.6).
    ///
    /// Adding to an existing direction re-weights the average price; closing
    /// or flipping realizes PnL on the closed portion and, on a flip, resets
    /// the average price to the fill price.
    pub fn on_execution(&mut self, fill: &ExecutionFeedback) {
        let signed_fill_qty = if fill.side_is_buy {
            fill.filled_quantity
        } else {
            -fill.filled_quantity
        };

        let pos = self
            .positions
            .entry(fill.symbol.clone())
            .or_insert_with(|| Position::flat(fill.symbol.clone(), fill.fill_time));

        let old_qty = pos.quantity;
        let new_qty = old_qty + signed_fill_qty;

        let same_direction_or_flat = old_qty.is_zero()
            || (old_qty.is_negative() == signed_fill_qty.is_negative());

        if same_direction_or_flat {
            let old_abs = old_qty.abs();
            let new_abs = new_qty.abs();
            if !new_abs.is_zero() {
                pos.average_price = (old_abs * pos.average_price
                    + fill.filled_quantity * fill.fill_price)
                    / new_abs;
            }
        } else {
            // Reducing or flipping: realize PnL on the closed portion.
            let closed_qty = old_qty.abs().min(fill.filled_quantity);
            let sign = if old_qty.is_negative() {
                Decimal::from_f64(-1.0)
            } else {
                Decimal::ONE
            };
            let realized = sign * (fill.fill_price - pos.average_price) * closed_qty;
            pos.realized_pnl = pos.realized_pnl + realized;

            if new_qty.signum() != 0 && new_qty.signum() != old_qty.signum() {
                // Flipped through flat: the new average is the fill price.
                pos.average_price = fill.fill_price;
            }
        }

        pos.quantity = new_qty;
        pos.last_update = fill.fill_time;

        self.metrics.total_trades += 1;
        if fill.fill_price > pos.average_price {
            self.metrics.winning_fills += 1;
        }
        self.metrics.win_rate = self.metrics.winning_fills as f64 / self.metrics.total_trades as f64;
    }

    /// Leverage = gross notional / capital allocation (0 if gross notional is
    /// essentially zero, using the same 0.1 absolute-notional "is it really
    /// zero" threshold as the source strategy). Drawdown breach additionally
    /// requires `|drawdown| > 0.001` so a float-noise drawdown right at the
    /// limit doesn't spuriously trip.
    pub fn check_risk_limits(&self, point_value: impl Fn(&str) -> Decimal) -> RiskCheckResult {
        let gross_notional: Decimal = self
            .positions
            .values()
            .map(|p| (p.quantity * p.average_price * point_value(&p.symbol)).abs())
            .fold(Decimal::ZERO, |a, b| a + b);

        let leverage = if gross_notional.abs().as_f64() < 0.1 {
            0.0
        } else if self.capital_allocation.is_zero() {
            0.0
        } else {
            (gross_notional / self.capital_allocation).as_f64()
        };

        let effective_max_leverage = if self.risk_limits.max_leverage <= 0.0 {
            2.0_f64.max(self.risk_limits.max_leverage)
        } else {
            self.risk_limits.max_leverage
        };

        let total_pnl = self.metrics.total_pnl.as_f64();
        let capital = self.capital_allocation.as_f64();
        let drawdown = if capital.abs() > f64::EPSILON {
            total_pnl / capital
        } else {
            0.0
        };

        let drawdown_breached = drawdown < -self.risk_limits.max_drawdown && drawdown.abs() > 0.001;

        RiskCheckResult {
            leverage,
            leverage_breached: leverage > effective_max_leverage,
            drawdown,
            drawdown_breached,
        }
    }

    pub fn get_positions(&self) -> &BTreeMap<String, Position> {
        &self.positions
    }

    /// Fold a day's mark-to-market PnL into an existing position (or open a
    /// flat one) and into the running total used by `check_risk_limits`'s
    /// drawdown check. Quantity and average price are untouched here — those
    /// only move on `on_execution`.
    pub fn apply_daily_pnl(&mut self, symbol: &str, daily_pnl: Decimal, at: Timestamp) {
        let pos = self
            .positions
            .entry(symbol.to_string())
            .or_insert_with(|| Position::flat(symbol.to_string(), at));
        pos.unrealized_pnl = pos.unrealized_pnl + daily_pnl;
        pos.last_update = at;
        self.metrics.total_pnl = self.metrics.total_pnl + daily_pnl;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts() -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn fill(symbol: &str, buy: bool, qty: f64, price: f64) -> ExecutionFeedback {
        ExecutionFeedback {
            symbol: symbol.to_string(),
            side_is_buy: buy,
            filled_quantity: Decimal::from_f64(qty),
            fill_price: Decimal::from_f64(price),
            fill_time: ts(),
        }
    }

    #[test]
    fn opening_a_long_sets_average_price() {
        let mut core = StrategyCore::new("s", Decimal::from_f64(100_000.0));
        core.on_execution(&fill("AAA", true, 10.0, 100.0));
        let pos = core.positions.get("AAA").unwrap();
        assert_eq!(pos.quantity, Decimal::from_f64(10.0));
        assert_eq!(pos.average_price, Decimal::from_f64(100.0));
    }

    #[test]
    fn adding_to_long_reweights_average() {
        let mut core = StrategyCore::new("s", Decimal::from_f64(100_000.0));
        core.on_execution(&fill("AAA", true, 10.0, 100.0));
        core.on_execution(&fill("AAA", true, 10.0, 120.0));
        let pos = core.positions.get("AAA").unwrap();
        assert_eq!(pos.quantity, Decimal::from_f64(20.0));
        assert_eq!(pos.average_price, Decimal::from_f64(110.0));
    }

    #[test]
    fn selling_long_realizes_pnl() {
        let mut core = StrategyCore::new("s", Decimal::from_f64(100_000.0));
        core.on_execution(&fill("AAA", true, 10.0, 100.0));
        core.on_execution(&fill("AAA", false, 4.0, 110.0));
        let pos = core.positions.get("AAA").unwrap();
        assert_eq!(pos.quantity, Decimal::from_f64(6.0));
        assert_eq!(pos.realized_pnl, Decimal::from_f64(40.0));
    }

    #[test]
    fn flipping_long_to_short_resets_average_price() {
        let mut core = StrategyCore::new("s", Decimal::from_f64(100_000.0));
        core.on_execution(&fill("AAA", true, 10.0, 100.0));
        core.on_execution(&fill("AAA", false, 15.0, 90.0));
        let pos = core.positions.get("AAA").unwrap();
        assert_eq!(pos.quantity, Decimal::from_f64(-5.0));
        assert_eq!(pos.average_price, Decimal::from_f64(90.0));
        assert_eq!(pos.realized_pnl, Decimal::from_f64(-100.0));
    }

    #[test]
    fn lifecycle_rejects_invalid_transition() {
        let mut core = StrategyCore::new("s", Decimal::ONE);
        assert!(core.pause().is_err());
        core.start().unwrap();
        core.pause().unwrap();
        core.resume().unwrap();
        core.stop().unwrap();
        assert!(core.start().is_err());
    }

    #[test]
    fn any_state_can_error_out() {
        let mut core = StrategyCore::new("s", Decimal::ONE);
        core.start().unwrap();
        assert!(core.transition(StrategyState::Error).is_ok());
    }

    #[test]
    fn zero_leverage_when_flat() {
        let core = StrategyCore::new("s", Decimal::from_f64(100_000.0));
        let r = core.check_risk_limits(|_| Decimal::ONE);
        assert_eq!(r.leverage, 0.0);
        assert!(!r.leverage_breached);
    }
}
