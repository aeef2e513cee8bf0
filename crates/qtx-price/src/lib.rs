//! qtx-price
//!
//! Previous-day close table (C2). Feeds the PnL manager and the execution
//! manager's pricing fallback. Pure in-memory state, no concurrency: the
//! backtest coordinator drives it single-threaded, one update per day.

use std::collections::BTreeMap;

use qtx_core::{Bar, Decimal, EngineError, ErrorCode};

#[derive(Default, Clone, Debug)]
pub struct PriceManager {
    previous_day_price: BTreeMap<String, Decimal>,
}

impl PriceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the previous-close entry for every symbol present in `bars`
    /// with that bar's close price.
    pub fn update_from_bars(&mut self, bars: &[Bar]) {
        for bar in bars {
            self.previous_day_price
                .insert(bar.symbol.clone(), bar.close);
        }
    }

    pub fn get_previous_day_price(&self, symbol: &str) -> Result<Decimal, EngineError> {
        self.previous_day_price.get(symbol).copied().ok_or_else(|| {
            EngineError::new(
                ErrorCode::DataNotFound,
                format!("no previous-day price for '{symbol}'"),
                "qtx-price::PriceManager::get_previous_day_price",
            )
        })
    }

    pub fn has_previous_day_price(&self, symbol: &str) -> bool {
        self.previous_day_price.contains_key(symbol)
    }

    pub fn get_all_previous_day_prices(&self) -> &BTreeMap<String, Decimal> {
        &self.previous_day_price
    }

    pub fn reset(&mut self) {
        self.previous_day_price.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn bar(symbol: &str, close: f64) -> Bar {
        Bar::new(
            symbol,
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            Decimal::from_f64(close),
            Decimal::from_f64(close + 1.0),
            Decimal::from_f64(close - 1.0),
            Decimal::from_f64(close),
            Decimal::from_f64(1000.0),
        )
        .unwrap()
    }

    #[test]
    fn missing_symbol_is_not_found() {
        let pm = PriceManager::new();
        assert!(pm.get_previous_day_price("AAA").is_err());
    }

    #[test]
    fn update_from_bars_stores_close() {
        let mut pm = PriceManager::new();
        pm.update_from_bars(&[bar("AAA", 101.5)]);
        assert_eq!(pm.get_previous_day_price("AAA").unwrap(), Decimal::from_f64(101.5));
    }

    #[test]
    fn later_update_overwrites_earlier() {
        let mut pm = PriceManager::new();
        pm.update_from_bars(&[bar("AAA", 100.0)]);
        pm.update_from_bars(&[bar("AAA", 105.0)]);
        assert_eq!(pm.get_previous_day_price("AAA").unwrap(), Decimal::from_f64(105.0));
    }

    #[test]
    fn reset_clears_all_entries() {
        let mut pm = PriceManager::new();
        pm.update_from_bars(&[bar("AAA", 100.0)]);
        pm.reset();
        assert!(!pm.has_previous_day_price("AAA"));
    }
}
