//! A single in-process snapshot store for top-of-book, recent trades,
//! positions, and balances — read by diagnostics and the monitor TUI.
//!
//! Grounded on `xbot/core/cache.py::MarketCache`: one lock guarding four
//! maps, a bounded ring buffer per symbol for trade prints. The Python
//! original guards everything with one `asyncio.Lock`; this is a hot,
//! short-held read/write path with no `.await` inside the critical
//! section, so a single `parking_lot::Mutex` around a small struct of
//! `HashMap`s is the direct idiomatic translation (no need for `DashMap`
//! here — unlike `MarketDataService`/`PositionService`, nothing here
//! calls out to a connector while holding the lock).

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

use crate::core::types::{Balance, CanonicalSymbol, Trade};

const TRADE_RING_CAPACITY: usize = 100;

#[derive(Default)]
struct Inner {
    top_of_book: HashMap<String, (Option<i64>, Option<i64>, i64)>,
    trades: HashMap<String, VecDeque<Trade>>,
    positions: HashMap<String, (rust_decimal::Decimal, i64)>,
    balances: HashMap<String, Balance>,
}

/// Cheap in-memory snapshot cache, independent of `PositionService`'s
/// aggregated-position semantics: this one just mirrors whatever the
/// lifecycle controller last observed, for display and diagnostics.
#[derive(Default)]
pub struct MarketCache {
    inner: Mutex<Inner>,
}

impl MarketCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_top(&self, symbol: &str, bid_i: Option<i64>, ask_i: Option<i64>, ts_millis: i64) {
        self.inner
            .lock()
            .top_of_book
            .insert(symbol.to_ascii_uppercase(), (bid_i, ask_i, ts_millis));
    }

    pub async fn get_top(&self, symbol: &str) -> Option<(Option<i64>, Option<i64>, i64)> {
        self.inner
            .lock()
            .top_of_book
            .get(&symbol.to_ascii_uppercase())
            .copied()
    }

    pub async fn add_trade(&self, symbol: &str, trade: Trade) {
        let mut inner = self.inner.lock();
        let ring = inner
            .trades
            .entry(symbol.to_ascii_uppercase())
            .or_insert_with(|| VecDeque::with_capacity(TRADE_RING_CAPACITY));
        if ring.len() == TRADE_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(trade);
    }

    pub async fn set_position(&self, symbol: &str, position: rust_decimal::Decimal, ts_millis: i64) {
        self.inner
            .lock()
            .positions
            .insert(symbol.to_ascii_uppercase(), (position, ts_millis));
    }

    pub async fn set_balance(&self, asset: &str, total_i: i64, available_i: i64, ts_millis: i64) {
        self.inner.lock().balances.insert(
            asset.to_ascii_uppercase(),
            Balance {
                total_i,
                available_i,
                ts_millis,
            },
        );
    }

    pub async fn snapshot_positions(&self) -> HashMap<String, (rust_decimal::Decimal, i64)> {
        self.inner.lock().positions.clone()
    }

    /// Returns up to `limit` most recent trades for `symbol`, newest last.
    pub async fn snapshot_trades(&self, symbol: &str, limit: usize) -> Vec<Trade> {
        let inner = self.inner.lock();
        match inner.trades.get(&symbol.to_ascii_uppercase()) {
            Some(ring) => {
                let len = ring.len();
                ring.iter().skip(len.saturating_sub(limit)).copied().collect()
            }
            None => Vec::new(),
        }
    }

    pub async fn snapshot_balances(&self) -> HashMap<String, Balance> {
        self.inner.lock().balances.clone()
    }

    pub async fn canonical_symbols_with_top_of_book(&self) -> Vec<CanonicalSymbol> {
        self.inner
            .lock()
            .top_of_book
            .keys()
            .map(|k| CanonicalSymbol(k.clone()))
            .collect()
    }
}
