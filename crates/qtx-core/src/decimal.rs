//! Fixed-precision money type.
//!
//! # Motivation
//!
//! Every monetary quantity in this system — price, order quantity, commission,
//! realized/unrealized PnL, capital — must accumulate without the rounding
//! drift a raw `f64` introduces over thousands of daily compounding steps.
//!
//! `Decimal` wraps [`rust_decimal::Decimal`] so the rest of the engine depends
//! on one narrow surface (`+ - * /`, `abs`, `is_negative`, comparison, a lossy
//! `as_f64` escape hatch) instead of the full third-party API. Unlike the
//! micros-scale fixed-point types used elsewhere in this codebase, money here
//! needs division (commission rates, position sizing, volatility scaling), so
//! a base-10 arbitrary-scale decimal is the right representation rather than
//! a fixed i64 scale.
//!
//! # Arithmetic
//!
//! `Add`, `Sub`, `Mul`, `Div`, `Neg` are implemented for `Decimal op Decimal`.
//! Division by zero panics, matching `rust_decimal`'s own behavior — callers
//! that might divide by a runtime-computed zero must check first.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal as InnerDecimal;
use serde::{Deserialize, Serialize};

/// A fixed-precision monetary/quantity scalar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Decimal(InnerDecimal);

impl Decimal {
    pub const ZERO: Decimal = Decimal(InnerDecimal::ZERO);
    pub const ONE: Decimal = Decimal(InnerDecimal::ONE);

    /// Construct from an `f64`. Lossy in the same way any binary-to-decimal
    /// conversion is lossy; intended for ingesting bar/price data that
    /// originates as floating point.
    pub fn from_f64(v: f64) -> Self {
        Decimal(InnerDecimal::from_f64_retain(v).unwrap_or(InnerDecimal::ZERO))
    }

    /// Construct from an `i64` whole-unit value.
    pub fn from_i64(v: i64) -> Self {
        Decimal(InnerDecimal::from(v))
    }

    /// Lossy conversion back to `f64`, for statistics (returns, Sharpe, ...)
    /// that are not themselves monetary accumulators.
    pub fn as_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn abs(self) -> Decimal {
        Decimal(self.0.abs())
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn signum(self) -> i32 {
        if self.0.is_zero() {
            0
        } else if self.0.is_sign_negative() {
            -1
        } else {
            1
        }
    }

    pub fn min(self, other: Decimal) -> Decimal {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }

    pub fn max(self, other: Decimal) -> Decimal {
        if self.0 >= other.0 {
            self
        } else {
            other
        }
    }

    /// `true` when `|self| < epsilon`. Used throughout the engine instead of
    /// `== 0` to compare quantities/prices that have passed through float
    /// ingestion.
    pub fn is_near_zero(self, epsilon: Decimal) -> bool {
        self.abs() <= epsilon
    }
}

impl Default for Decimal {
    fn default() -> Self {
        Decimal::ZERO
    }
}

impl Add for Decimal {
    type Output = Decimal;
    fn add(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 + rhs.0)
    }
}

impl Sub for Decimal {
    type Output = Decimal;
    fn sub(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 - rhs.0)
    }
}

impl Mul for Decimal {
    type Output = Decimal;
    fn mul(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 * rhs.0)
    }
}

impl Div for Decimal {
    type Output = Decimal;
    fn div(self, rhs: Decimal) -> Decimal {
        Decimal(self.0 / rhs.0)
    }
}

impl Neg for Decimal {
    type Output = Decimal;
    fn neg(self) -> Decimal {
        Decimal(-self.0)
    }
}

impl PartialOrd<f64> for Decimal {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.as_f64().partial_cmp(other)
    }
}

impl PartialEq<f64> for Decimal {
    fn eq(&self, other: &f64) -> bool {
        self.as_f64() == *other
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Decimal {
    fn from(v: i64) -> Self {
        Decimal::from_i64(v)
    }
}

impl From<f64> for Decimal {
    fn from(v: f64) -> Self {
        Decimal::from_f64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_additive_identity() {
        let a = Decimal::from_f64(42.5);
        assert_eq!(a + Decimal::ZERO, a);
        assert_eq!(Decimal::ZERO + a, a);
    }

    #[test]
    fn add_and_sub_roundtrip() {
        let a = Decimal::from_f64(100.0);
        let b = Decimal::from_f64(25.0);
        assert_eq!((a + b) - b, a);
    }

    #[test]
    fn division_is_exact_for_simple_ratios() {
        let a = Decimal::from_f64(10.0);
        let b = Decimal::from_f64(4.0);
        assert_eq!((a / b).as_f64(), 2.5);
    }

    #[test]
    fn neg_produces_opposite_sign() {
        let pos = Decimal::from_f64(5.0);
        let neg = -pos;
        assert!(neg.is_negative());
        assert_eq!(-neg, pos);
    }

    #[test]
    fn abs_of_negative() {
        let neg = Decimal::from_f64(-10.0);
        assert_eq!(neg.abs(), Decimal::from_f64(10.0));
    }

    #[test]
    fn is_near_zero_within_epsilon() {
        let tiny = Decimal::from_f64(0.00000005);
        assert!(tiny.is_near_zero(Decimal::from_f64(1e-4)));
        assert!(!Decimal::from_f64(1.0).is_near_zero(Decimal::from_f64(1e-4)));
    }

    #[test]
    fn ordering_matches_value() {
        let a = Decimal::from_f64(1.0);
        let b = Decimal::from_f64(2.0);
        assert!(a < b);
        assert!(b > a);
        assert!(a <= a);
    }

    #[test]
    fn signum_values() {
        assert_eq!(Decimal::from_f64(5.0).signum(), 1);
        assert_eq!(Decimal::from_f64(-5.0).signum(), -1);
        assert_eq!(Decimal::ZERO.signum(), 0);
    }
}
