//! Slippage model (C5): a pure function of (price, qty, side, optional bar).

use qtx_core::{Bar, Decimal, Side};

#[derive(Clone, Debug, PartialEq)]
pub enum SlippageModel {
    None,
    FixedBps(Decimal),
    Spread {
        min_spread_bps: Decimal,
        spread_multiplier: Decimal,
        market_impact_multiplier: Decimal,
        /// Rolling estimate of recent bar spread in bps, updated via `update`.
        recent_spread_bps: Decimal,
    },
}

impl SlippageModel {
    pub fn spread_default() -> Self {
        SlippageModel::Spread {
            min_spread_bps: Decimal::from_f64(5.0),
            spread_multiplier: Decimal::from_f64(1.2),
            market_impact_multiplier: Decimal::from_f64(1.5),
            recent_spread_bps: Decimal::ZERO,
        }
    }

    /// Update the rolling spread estimate from a fresh bar. No-op for models
    /// that don't track one.
    pub fn update(&mut self, bar: &Bar) {
        if let SlippageModel::Spread {
            recent_spread_bps, ..
        } = self
        {
            if !bar.close.is_zero() {
                *recent_spread_bps = (bar.high - bar.low) * Decimal::from_f64(10_000.0) / bar.close;
            }
        }
    }

    /// Apply slippage to `price` for an order of `qty` contracts on `side`.
    pub fn calculate_slippage(&self, price: Decimal, qty: Decimal, side: Side) -> Decimal {
        let direction = match side {
            Side::Buy => Decimal::ONE,
            Side::Sell => -Decimal::ONE,
        };
        match self {
            SlippageModel::None => price,
            SlippageModel::FixedBps(bps) => {
                price + price * (*bps / Decimal::from_f64(10_000.0)) * direction
            }
            SlippageModel::Spread {
                min_spread_bps,
                spread_multiplier,
                market_impact_multiplier,
                recent_spread_bps,
            } => {
                let spread_estimate = (*recent_spread_bps * *spread_multiplier).max(*min_spread_bps);
                let spread_shift = price * (spread_estimate / Decimal::from_f64(10_000.0)) * direction;
                let impact_shift =
                    qty.abs() * price * Decimal::from_f64(1e-4) * *market_impact_multiplier * direction;
                price + spread_shift + impact_shift
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(close: f64, high: f64, low: f64) -> Bar {
        Bar::new(
            "AAA",
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            Decimal::from_f64(close),
            Decimal::from_f64(high),
            Decimal::from_f64(low),
            Decimal::from_f64(close),
            Decimal::from_f64(1000.0),
        )
        .unwrap()
    }

    #[test]
    fn none_model_is_a_no_op() {
        let model = SlippageModel::None;
        let p = model.calculate_slippage(Decimal::from_f64(100.0), Decimal::from_f64(10.0), Side::Buy);
        assert_eq!(p, Decimal::from_f64(100.0));
    }

    #[test]
    fn fixed_bps_widens_buy_and_narrows_sell() {
        let model = SlippageModel::FixedBps(Decimal::from_f64(100.0)); // 1%
        let buy = model.calculate_slippage(Decimal::from_f64(100.0), Decimal::from_f64(1.0), Side::Buy);
        let sell = model.calculate_slippage(Decimal::from_f64(100.0), Decimal::from_f64(1.0), Side::Sell);
        assert_eq!(buy, Decimal::from_f64(101.0));
        assert_eq!(sell, Decimal::from_f64(99.0));
    }

    #[test]
    fn spread_model_widens_with_wider_bars() {
        let mut narrow = SlippageModel::spread_default();
        narrow.update(&bar(100.0, 100.5, 99.5));
        let mut wide = SlippageModel::spread_default();
        wide.update(&bar(100.0, 110.0, 90.0));

        let p_narrow = narrow.calculate_slippage(Decimal::from_f64(100.0), Decimal::from_f64(1.0), Side::Buy);
        let p_wide = wide.calculate_slippage(Decimal::from_f64(100.0), Decimal::from_f64(1.0), Side::Buy);
        assert!(p_wide > p_narrow);
    }

    #[test]
    fn spread_model_applies_market_impact_proportional_to_size() {
        let mut model = SlippageModel::spread_default();
        model.update(&bar(100.0, 100.5, 99.5));
        let small = model.calculate_slippage(Decimal::from_f64(100.0), Decimal::from_f64(1.0), Side::Buy);
        let large = model.calculate_slippage(Decimal::from_f64(100.0), Decimal::from_f64(1000.0), Side::Buy);
        assert!(large > small);
    }
}
