//! Deterministic run identifier formatting.
//!
//! Pure string formatting, no I/O. Strategy names are sorted before joining
//! so the run id is independent of the order strategies were registered in.

use chrono::{DateTime, Utc};

fn combine_strategy_names(strategy_names: &[impl AsRef<str>]) -> String {
    if strategy_names.is_empty() {
        return String::new();
    }
    let mut sorted: Vec<&str> = strategy_names.iter().map(|s| s.as_ref()).collect();
    sorted.sort_unstable();
    sorted.join("&")
}

fn timestamp_string(ts: DateTime<Utc>) -> String {
    format!(
        "{}_{:03}",
        ts.format("%Y%m%d_%H%M%S"),
        ts.timestamp_subsec_millis()
    )
}

fn date_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%d").to_string()
}

pub struct RunIdGenerator;

impl RunIdGenerator {
    pub fn portfolio(strategy_names: &[impl AsRef<str>], timestamp: DateTime<Utc>) -> String {
        format!(
            "{}_{}",
            combine_strategy_names(strategy_names),
            timestamp_string(timestamp)
        )
    }

    pub fn strategy(strategy_name: &str, timestamp: DateTime<Utc>) -> String {
        format!("{}_{}", strategy_name, timestamp_string(timestamp))
    }

    pub fn live_portfolio(
        strategy_names: &[impl AsRef<str>],
        date: DateTime<Utc>,
        sequence: u32,
    ) -> String {
        format!(
            "{}_{}_{:03}",
            combine_strategy_names(strategy_names),
            date_string(date),
            sequence
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 9, 30, 1).unwrap()
    }

    #[test]
    fn portfolio_id_sorts_strategy_names() {
        let a = RunIdGenerator::portfolio(&["Beta", "Alpha"], ts());
        let b = RunIdGenerator::portfolio(&["Alpha", "Beta"], ts());
        assert_eq!(a, b);
        assert!(a.starts_with("Alpha&Beta_20240305_093001_"));
    }

    #[test]
    fn strategy_id_format() {
        let id = RunIdGenerator::strategy("Trend", ts());
        assert!(id.starts_with("Trend_20240305_093001_"));
    }

    #[test]
    fn live_portfolio_id_uses_date_and_sequence() {
        let id = RunIdGenerator::live_portfolio(&["A"], ts(), 7);
        assert_eq!(id, "A_20240305_007");
    }
}
