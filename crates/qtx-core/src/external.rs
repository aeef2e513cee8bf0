//! Seams onto out-of-scope external collaborators (§6).
//!
//! The database, the market-data bus, and the instrument catalogue are not
//! implemented in this crate set — they live behind a running system's own
//! connection pooling and storage layer. What the core *does* need is a
//! narrow, synchronous trait it can depend on so `qtx-pnl`/`qtx-backtest`
//! compile and test against a fake without pulling in a real database.

use crate::decimal::Decimal;
use crate::error::EngineError;
use crate::primitives::{AssetClass, Bar, ExecutionReport, Frequency, Position, Timestamp};

/// Resolves point value / contract multiplier for a symbol. Backed by an
/// instrument catalogue in a real deployment; the PnL and execution managers
/// only need this one lookup out of the full instrument registry contract.
pub trait PointValueSource {
    fn point_value(&self, symbol: &str) -> Option<Decimal>;
}

/// Loads historical bars for a backtest run. Grouping by timestamp into an
/// ordered day sequence is pure and lives in this crate (`group_bars_by_timestamp`);
/// only the load itself is external.
pub trait DataLoader {
    fn load_market_data(
        &self,
        symbols: &[String],
        start: Timestamp,
        end: Timestamp,
        asset_class: AssetClass,
        freq: Frequency,
    ) -> Result<Vec<Bar>, EngineError>;
}

/// Minimal persistence seam a caller may supply. The coordinator never
/// constructs one; it only calls through `Option<&dyn DatabaseInterface>`
/// where a hook is offered, and every call here is a no-op save, not a
/// correctness dependency of the simulation itself.
pub trait DatabaseInterface {
    fn store_backtest_positions(
        &self,
        run_id: &str,
        portfolio_id: &str,
        positions: &[Position],
    ) -> Result<(), EngineError>;

    fn store_executions(&self, run_id: &str, executions: &[ExecutionReport]) -> Result<(), EngineError>;
}

/// Group bars into an ordered-by-timestamp sequence of per-day bar sets.
/// Pure, deterministic: sorts by timestamp once, preserving within-timestamp
/// input order for symbols at the same instant.
pub fn group_bars_by_timestamp(mut bars: Vec<Bar>) -> Vec<(Timestamp, Vec<Bar>)> {
    bars.sort_by_key(|b| b.timestamp);
    let mut out: Vec<(Timestamp, Vec<Bar>)> = Vec::new();
    for bar in bars {
        match out.last_mut() {
            Some((ts, group)) if *ts == bar.timestamp => group.push(bar),
            _ => out.push((bar.timestamp, vec![bar])),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(symbol: &str, day: i64) -> Bar {
        Bar::new(
            symbol,
            Utc.timestamp_opt(1_700_000_000 + day * 86_400, 0).unwrap(),
            Decimal::from_f64(10.0),
            Decimal::from_f64(11.0),
            Decimal::from_f64(9.0),
            Decimal::from_f64(10.5),
            Decimal::from_f64(100.0),
        )
        .unwrap()
    }

    #[test]
    fn groups_same_timestamp_bars_together() {
        let bars = vec![bar("AAA", 0), bar("BBB", 0), bar("AAA", 1)];
        let grouped = group_bars_by_timestamp(bars);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].1.len(), 2);
        assert_eq!(grouped[1].1.len(), 1);
    }

    #[test]
    fn groups_are_sorted_by_timestamp() {
        let bars = vec![bar("AAA", 2), bar("AAA", 0), bar("AAA", 1)];
        let grouped = group_bars_by_timestamp(bars);
        assert!(grouped[0].0 < grouped[1].0);
        assert!(grouped[1].0 < grouped[2].0);
    }
}
