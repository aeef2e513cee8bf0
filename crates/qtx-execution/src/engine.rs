//! Execution manager (C4): diffs current vs target positions into
//! `ExecutionReport`s priced off the previous close, with slippage and
//! commission applied. Pure and deterministic — symbols are walked in
//! lexicographic order via `BTreeMap`/`BTreeSet` so two runs over the same
//! inputs produce byte-identical output, the same discipline
//! `targets_to_order_intents` uses for order-intent generation.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use qtx_core::{Bar, Decimal, ExecutionReport, Side};

use crate::slippage::SlippageModel;

/// Minimum absolute position delta worth executing on; anything smaller is
/// noise from float-origin target sizing.
const MIN_TRADE_DELTA: f64 = 1e-4;

pub struct ExecutionManager {
    pub commission_rate: Decimal,
    pub fixed_commission: Decimal,
    pub slippage_bps: Decimal,
    pub slippage_model: Option<SlippageModel>,
    sequence: u64,
}

impl ExecutionManager {
    pub fn new(commission_rate: Decimal, fixed_commission: Decimal, slippage_bps: Decimal) -> Self {
        Self {
            commission_rate,
            fixed_commission,
            slippage_bps,
            slippage_model: None,
            sequence: 0,
        }
    }

    pub fn with_slippage_model(mut self, model: SlippageModel) -> Self {
        self.slippage_model = Some(model);
        self
    }

    fn next_id(&mut self, stamp: DateTime<Utc>) -> (String, String) {
        self.sequence += 1;
        let ts = stamp.timestamp_millis();
        (
            format!("ORD-{ts}-{}", self.sequence),
            format!("EXE-{ts}-{}", self.sequence),
        )
    }

    /// Generate executions for one day's target rebalance.
    ///
    /// `today_bars` is consulted only as a first-trade fallback price when a
    /// symbol has no previous close yet (§4.4 step 2) — it is never used to
    /// price an execution once a previous close exists, preserving the
    /// no-lookahead invariant.
    pub fn generate_executions(
        &mut self,
        current_positions: &BTreeMap<String, Decimal>,
        target_positions: &BTreeMap<String, Decimal>,
        previous_close_prices: &BTreeMap<String, Decimal>,
        today_bars: &BTreeMap<String, Bar>,
        stamp: DateTime<Utc>,
        strategy_id: &str,
    ) -> Vec<ExecutionReport> {
        let mut symbols: BTreeSet<&String> = BTreeSet::new();
        symbols.extend(current_positions.keys());
        symbols.extend(target_positions.keys());

        let mut reports = Vec::new();

        for symbol in symbols {
            let current = *current_positions.get(symbol).unwrap_or(&Decimal::ZERO);
            let target = *target_positions.get(symbol).unwrap_or(&Decimal::ZERO);
            let delta = target - current;

            if delta.abs().as_f64() < MIN_TRADE_DELTA {
                continue;
            }

            let side = if delta.is_negative() { Side::Sell } else { Side::Buy };

            let base_price = match previous_close_prices.get(symbol) {
                Some(p) => *p,
                None => match today_bars.get(symbol) {
                    Some(bar) => bar.close,
                    None => continue,
                },
            };

            let exec_price = match &self.slippage_model {
                Some(model) => model.calculate_slippage(base_price, delta, side),
                None => {
                    let direction = match side {
                        Side::Buy => Decimal::ONE,
                        Side::Sell => -Decimal::ONE,
                    };
                    base_price + base_price * (self.slippage_bps / Decimal::from_f64(10_000.0)) * direction
                }
            };

            let abs_delta = delta.abs();
            let commission = abs_delta * self.commission_rate
                + abs_delta * exec_price * Decimal::from_f64(0.0005)
                + self.fixed_commission;

            let (order_id, exec_id) = self.next_id(stamp);

            reports.push(ExecutionReport {
                order_id,
                exec_id,
                symbol: symbol.clone(),
                side,
                filled_quantity: abs_delta,
                fill_price: exec_price,
                fill_time: stamp,
                commission,
                is_partial: false,
                strategy_id: strategy_id.to_string(),
            });
        }

        reports
    }

    /// Reprice an already-diffed, zero-commission execution intent (as
    /// produced by the portfolio manager's own internal diff step) through
    /// this manager's configured slippage model/bps and commission formula.
    /// `raw.fill_price` is taken as the base price the intent was generated
    /// against (the previous close); `raw.side`/`raw.filled_quantity`/
    /// `raw.symbol`/`raw.strategy_id` pass through unchanged. Call
    /// `slippage_model`'s `update` with today's bar before this so a spread
    /// model reflects current volatility without using the bar as a price.
    pub fn reprice(&mut self, raw: &ExecutionReport, stamp: DateTime<Utc>) -> ExecutionReport {
        let exec_price = match &self.slippage_model {
            Some(model) => model.calculate_slippage(raw.fill_price, raw.filled_quantity, raw.side),
            None => {
                let direction = match raw.side {
                    Side::Buy => Decimal::ONE,
                    Side::Sell => -Decimal::ONE,
                };
                raw.fill_price + raw.fill_price * (self.slippage_bps / Decimal::from_f64(10_000.0)) * direction
            }
        };

        let commission = raw.filled_quantity * self.commission_rate
            + raw.filled_quantity * exec_price * Decimal::from_f64(0.0005)
            + self.fixed_commission;

        let (order_id, exec_id) = self.next_id(stamp);

        ExecutionReport {
            order_id,
            exec_id,
            symbol: raw.symbol.clone(),
            side: raw.side,
            filled_quantity: raw.filled_quantity,
            fill_price: exec_price,
            fill_time: stamp,
            commission,
            is_partial: raw.is_partial,
            strategy_id: raw.strategy_id.clone(),
        }
    }
}
