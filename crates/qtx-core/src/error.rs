//! Engine-wide error taxonomy.
//!
//! One result type crosses every component boundary in this crate set:
//! `Result<T, EngineError>`. No panics escape a public function except where
//! a prior `debug_assert!` has already established the invariant.

use std::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArgument,
    NotInitialized,
    InvalidOrder,
    OrderRejected,
    PositionLimitExceeded,
    RiskLimitExceeded,
    StrategyError,
    MarketDataError,
    DataNotFound,
    ConversionError,
    DatabaseError,
    ConnectionError,
    UnknownError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorCode::InvalidArgument => "INVALID_ARGUMENT",
            ErrorCode::NotInitialized => "NOT_INITIALIZED",
            ErrorCode::InvalidOrder => "INVALID_ORDER",
            ErrorCode::OrderRejected => "ORDER_REJECTED",
            ErrorCode::PositionLimitExceeded => "POSITION_LIMIT_EXCEEDED",
            ErrorCode::RiskLimitExceeded => "RISK_LIMIT_EXCEEDED",
            ErrorCode::StrategyError => "STRATEGY_ERROR",
            ErrorCode::MarketDataError => "MARKET_DATA_ERROR",
            ErrorCode::DataNotFound => "DATA_NOT_FOUND",
            ErrorCode::ConversionError => "CONVERSION_ERROR",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::ConnectionError => "CONNECTION_ERROR",
            ErrorCode::UnknownError => "UNKNOWN_ERROR",
        };
        write!(f, "{s}")
    }
}

/// The single error type returned across every crate boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
    pub source: &'static str,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>, source: &'static str) -> Self {
        Self {
            code,
            message: message.into(),
            source,
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({})", self.code, self.message, self.source)
    }
}

impl std::error::Error for EngineError {}
