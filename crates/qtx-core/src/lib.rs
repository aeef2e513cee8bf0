//! qtx-core
//!
//! Foundational data model (C1): the fixed-precision `Decimal` type, tagged
//! domain primitives (bars, orders, fills, positions), the engine-wide error
//! taxonomy, run-id formatting, and the trait seams onto out-of-scope
//! external collaborators (database, market-data bus, instrument registry).
//!
//! Pure, deterministic, no IO, no time-of-day access.

mod decimal;
mod error;
mod external;
mod primitives;
mod run_id;

pub use decimal::Decimal;
pub use error::{EngineError, ErrorCode};
pub use external::{group_bars_by_timestamp, DataLoader, DatabaseInterface, PointValueSource};
pub use primitives::{
    AssetClass, Bar, ExecutionReport, Frequency, Order, OrderType, Position, Side, TimeInForce,
    Timestamp,
};
pub use run_id::RunIdGenerator;
