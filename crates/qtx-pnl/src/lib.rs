//! qtx-pnl
//!
//! Daily PnL computation (C3): per-position `qty * (close_today - close_yesterday)
//! * point_value`, plus the previous-close table this engine's PnL is valued
//! against (distinct from the execution manager's own previous-close reads —
//! §4.3 vs §4.4 — kept in separate crates so the execution manager can be
//! tested without pulling in the PnL manager's point-value seam).

use std::collections::BTreeMap;

use qtx_core::{Decimal, PointValueSource};

/// Result of a single position's daily PnL calculation.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PositionPnl {
    pub daily_pnl: Decimal,
    pub valid: bool,
}

impl PositionPnl {
    fn invalid() -> Self {
        Self {
            daily_pnl: Decimal::ZERO,
            valid: false,
        }
    }
}

pub struct PnlManager<'a> {
    previous_close: BTreeMap<String, Decimal>,
    point_values: &'a dyn PointValueSource,
}

impl<'a> PnlManager<'a> {
    pub fn new(point_values: &'a dyn PointValueSource) -> Self {
        Self {
            previous_close: BTreeMap::new(),
            point_values,
        }
    }

    pub fn has_previous_close(&self, symbol: &str) -> bool {
        self.previous_close.contains_key(symbol)
    }

    pub fn get_previous_close(&self, symbol: &str) -> Option<Decimal> {
        self.previous_close.get(symbol).copied()
    }

    pub fn set_previous_close(&mut self, symbol: impl Into<String>, price: Decimal) {
        self.previous_close.insert(symbol.into(), price);
    }

    pub fn update_previous_closes(&mut self, closes: &BTreeMap<String, Decimal>) {
        for (symbol, price) in closes {
            self.previous_close.insert(symbol.clone(), *price);
        }
    }

    /// `daily_pnl = qty * (curr_close - prev_close) * point_value`.
    ///
    /// `valid = false` when the quantity is within 1e-8 of flat, the previous
    /// close is unknown, or the instrument has no point value on file —
    /// matching the "recover locally" policy (§7): the coordinator logs and
    /// skips rather than treating this as a hard error.
    pub fn calculate_position_pnl(&self, symbol: &str, qty: Decimal, curr_close: Decimal) -> PositionPnl {
        if qty.is_near_zero(Decimal::from_f64(1e-8)) {
            return PositionPnl::invalid();
        }
        let prev_close = match self.previous_close.get(symbol) {
            Some(p) => *p,
            None => return PositionPnl::invalid(),
        };
        let point_value = match self.point_values.point_value(symbol) {
            Some(pv) => pv,
            None => return PositionPnl::invalid(),
        };
        PositionPnl {
            daily_pnl: qty * (curr_close - prev_close) * point_value,
            valid: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPointValue(Decimal);
    impl PointValueSource for FixedPointValue {
        fn point_value(&self, _symbol: &str) -> Option<Decimal> {
            Some(self.0)
        }
    }
    struct NoPointValue;
    impl PointValueSource for NoPointValue {
        fn point_value(&self, _symbol: &str) -> Option<Decimal> {
            None
        }
    }

    #[test]
    fn pnl_scales_by_qty_delta_and_point_value() {
        let pv = FixedPointValue(Decimal::from_f64(2.0));
        let mut mgr = PnlManager::new(&pv);
        mgr.set_previous_close("AAA", Decimal::from_f64(100.0));
        let r = mgr.calculate_position_pnl("AAA", Decimal::from_f64(10.0), Decimal::from_f64(103.0));
        assert!(r.valid);
        assert_eq!(r.daily_pnl, Decimal::from_f64(60.0));
    }

    #[test]
    fn missing_previous_close_is_invalid() {
        let pv = FixedPointValue(Decimal::ONE);
        let mgr = PnlManager::new(&pv);
        let r = mgr.calculate_position_pnl("AAA", Decimal::from_f64(10.0), Decimal::from_f64(103.0));
        assert!(!r.valid);
    }

    #[test]
    fn flat_quantity_is_invalid() {
        let pv = FixedPointValue(Decimal::ONE);
        let mut mgr = PnlManager::new(&pv);
        mgr.set_previous_close("AAA", Decimal::from_f64(100.0));
        let r = mgr.calculate_position_pnl("AAA", Decimal::ZERO, Decimal::from_f64(103.0));
        assert!(!r.valid);
    }

    #[test]
    fn missing_point_value_is_invalid() {
        let pv = NoPointValue;
        let mut mgr = PnlManager::new(&pv);
        mgr.set_previous_close("AAA", Decimal::from_f64(100.0));
        let r = mgr.calculate_position_pnl("AAA", Decimal::from_f64(10.0), Decimal::from_f64(103.0));
        assert!(!r.valid);
    }
}
