//! Shared domain primitives: bars, orders, fills, positions and their tagged
//! enums. Pure data — no behavior beyond construction-time validation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Decimal;
use crate::error::{EngineError, ErrorCode};

pub type Timestamp = DateTime<Utc>;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
    Stop,
    StopLimit,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    Gtc,
    Ioc,
    Fok,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    Equity,
    Future,
    Option,
    Forex,
    Crypto,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Tick,
    Minute1,
    Minute5,
    Minute15,
    Hour1,
    Daily,
}

/// One OHLCV record for a symbol at a given frequency. Immutable.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: Timestamp,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: Timestamp,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, EngineError> {
        let symbol = symbol.into();
        if symbol.is_empty() {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                "Bar.symbol must be non-empty",
                "qtx-core::primitives::Bar::new",
            ));
        }
        if low > high {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                "Bar.low must be <= Bar.high",
                "qtx-core::primitives::Bar::new",
            ));
        }
        if open < low || open > high || close < low || close > high {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                "Bar.open/close must lie within [low, high]",
                "qtx-core::primitives::Bar::new",
            ));
        }
        if volume.is_negative() {
            return Err(EngineError::new(
                ErrorCode::InvalidArgument,
                "Bar.volume must be >= 0",
                "qtx-core::primitives::Bar::new",
            ));
        }
        Ok(Self {
            symbol,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// A caller-submitted order, validated against a strategy's configured
/// sizing/notional limits before the execution manager will act on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub tif: TimeInForce,
    pub timestamp: Timestamp,
    pub strategy_id: String,
}

impl Order {
    pub fn validate(&self, max_order_size: Decimal, max_notional: Decimal) -> Result<(), EngineError> {
        if self.symbol.is_empty() {
            return Err(EngineError::new(
                ErrorCode::InvalidOrder,
                "Order.symbol must be non-empty",
                "qtx-core::primitives::Order::validate",
            ));
        }
        if !(self.quantity > Decimal::ZERO) {
            return Err(EngineError::new(
                ErrorCode::InvalidOrder,
                "Order.quantity must be > 0",
                "qtx-core::primitives::Order::validate",
            ));
        }
        if matches!(self.order_type, OrderType::Limit | OrderType::StopLimit) {
            match self.price {
                Some(p) if p > Decimal::ZERO => {}
                _ => {
                    return Err(EngineError::new(
                        ErrorCode::InvalidOrder,
                        "Limit/StopLimit orders require a price > 0",
                        "qtx-core::primitives::Order::validate",
                    ))
                }
            }
        }
        if max_order_size > Decimal::ZERO && self.quantity > max_order_size {
            return Err(EngineError::new(
                ErrorCode::PositionLimitExceeded,
                "Order.quantity exceeds max_order_size",
                "qtx-core::primitives::Order::validate",
            ));
        }
        if max_notional > Decimal::ZERO {
            if let Some(p) = self.price {
                if self.quantity * p > max_notional {
                    return Err(EngineError::new(
                        ErrorCode::PositionLimitExceeded,
                        "Order notional exceeds max_notional",
                        "qtx-core::primitives::Order::validate",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A completed (possibly partial) fill, produced only by the execution
/// manager. Immutable once created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub order_id: String,
    pub exec_id: String,
    pub symbol: String,
    pub side: Side,
    pub filled_quantity: Decimal,
    pub fill_price: Decimal,
    pub fill_time: Timestamp,
    pub commission: Decimal,
    pub is_partial: bool,
    pub strategy_id: String,
}

/// A symbol-level position held by a strategy or by the aggregate portfolio.
/// Average-price accounting (not FIFO lots) per the data model contract.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub average_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub last_update: Timestamp,
}

impl Position {
    pub fn flat(symbol: impl Into<String>, at: Timestamp) -> Self {
        Self {
            symbol: symbol.into(),
            quantity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            realized_pnl: Decimal::ZERO,
            last_update: at,
        }
    }

    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    pub fn mark_to_market(&mut self, price: Decimal, point_value: Decimal) {
        self.unrealized_pnl = self.quantity * (price - self.average_price) * point_value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(i: i64) -> Timestamp {
        Utc.timestamp_opt(1_700_000_000 + i * 86_400, 0).unwrap()
    }

    #[test]
    fn bar_rejects_empty_symbol() {
        let r = Bar::new(
            "",
            ts(0),
            Decimal::from_f64(1.0),
            Decimal::from_f64(1.0),
            Decimal::from_f64(1.0),
            Decimal::from_f64(1.0),
            Decimal::ZERO,
        );
        assert!(r.is_err());
    }

    #[test]
    fn bar_rejects_low_above_high() {
        let r = Bar::new(
            "AAA",
            ts(0),
            Decimal::from_f64(1.0),
            Decimal::from_f64(1.0),
            Decimal::from_f64(2.0),
            Decimal::from_f64(1.0),
            Decimal::ZERO,
        );
        assert!(r.is_err());
    }

    #[test]
    fn bar_accepts_valid_ohlc() {
        let r = Bar::new(
            "AAA",
            ts(0),
            Decimal::from_f64(10.0),
            Decimal::from_f64(12.0),
            Decimal::from_f64(9.0),
            Decimal::from_f64(11.0),
            Decimal::from_f64(1000.0),
        );
        assert!(r.is_ok());
    }

    #[test]
    fn position_starts_flat() {
        let p = Position::flat("AAA", ts(0));
        assert!(p.is_flat());
        assert_eq!(p.unrealized_pnl, Decimal::ZERO);
    }

    #[test]
    fn order_validate_requires_positive_quantity() {
        let o = Order {
            symbol: "AAA".into(),
            side: Side::Buy,
            order_type: OrderType::Market,
            quantity: Decimal::ZERO,
            price: None,
            tif: TimeInForce::Day,
            timestamp: ts(0),
            strategy_id: "s1".into(),
        };
        assert!(o.validate(Decimal::from_f64(1000.0), Decimal::from_f64(1_000_000.0)).is_err());
    }
}
