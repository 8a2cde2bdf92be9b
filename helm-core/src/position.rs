//! In-memory aggregated position snapshots, keyed by canonical symbol.
//!
//! Each ingested snapshot replaces the previous one for its symbol; there
//! is no cross-venue aggregation at this layer. A higher service can
//! compose per-venue instances if a strategy needs that.

use dashmap::DashMap;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::core::types::CanonicalSymbol;

/// A single venue's latest reported position for one canonical symbol.
#[derive(Debug, Clone)]
pub struct PositionSnapshot {
    pub canonical_symbol: CanonicalSymbol,
    pub base_qty: Decimal,
    pub quote_value: Decimal,
    pub notional: Decimal,
    pub raw: Map<String, Value>,
    pub ts_millis: i64,
}

/// Aggregates the latest position per canonical symbol. `dashmap` gives
/// per-symbol locking without making every reader serialize behind one
/// big mutex.
#[derive(Default)]
pub struct PositionService {
    positions: DashMap<String, PositionSnapshot>,
}

impl PositionService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ingest(&self, snapshot: PositionSnapshot) {
        self.positions
            .insert(snapshot.canonical_symbol.0.to_ascii_uppercase(), snapshot);
    }

    pub fn get_position(&self, symbol: &str) -> Option<PositionSnapshot> {
        self.positions
            .get(&symbol.to_ascii_uppercase())
            .map(|r| r.value().clone())
    }

    pub fn all_positions(&self) -> Vec<PositionSnapshot> {
        self.positions.iter().map(|r| r.value().clone()).collect()
    }

    pub fn reset(&self, symbol: Option<&str>) {
        match symbol {
            Some(s) => {
                self.positions.remove(&s.to_ascii_uppercase());
            }
            None => self.positions.clear(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snap(symbol: &str, qty: Decimal) -> PositionSnapshot {
        PositionSnapshot {
            canonical_symbol: CanonicalSymbol::from(symbol),
            base_qty: qty,
            quote_value: Decimal::ZERO,
            notional: Decimal::ZERO,
            raw: Map::new(),
            ts_millis: 0,
        }
    }

    #[test]
    fn ingest_then_read_latest() {
        let svc = PositionService::new();
        svc.ingest(snap("SOL", dec!(1.0)));
        svc.ingest(snap("SOL", dec!(1.5)));
        assert_eq!(svc.get_position("sol").unwrap().base_qty, dec!(1.5));
    }

    #[test]
    fn reset_one_symbol_leaves_others() {
        let svc = PositionService::new();
        svc.ingest(snap("SOL", dec!(1.0)));
        svc.ingest(snap("BTC", dec!(2.0)));
        svc.reset(Some("SOL"));
        assert!(svc.get_position("SOL").is_none());
        assert!(svc.get_position("BTC").is_some());
    }

    #[test]
    fn reset_all() {
        let svc = PositionService::new();
        svc.ingest(snap("SOL", dec!(1.0)));
        svc.reset(None);
        assert!(svc.all_positions().is_empty());
    }
}
