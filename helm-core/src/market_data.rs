//! Canonical↔venue symbol mapping and fixed-point scaling.
//!
//! Grounded on `xbot/execution/market_data_service.py`: canonical symbols
//! are resolved to venue strings from a static map; price/size decimals
//! and minimum sizes are memoized behind a per-symbol lock so concurrent
//! resolvers coalesce onto one connector call (spec.md §8 scenario 6); the
//! only decimal arithmetic anywhere in the engine boundary happens here,
//! converting to integers by truncating toward zero (never overstating a
//! size or price).

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio::sync::Mutex as AsyncMutex;

use crate::connector::Connector;
use crate::core::errors::EngineError;
use crate::core::types::{CanonicalSymbol, VenueSymbol};
use crate::Result;

/// Canonical symbol resolution plus memoized precision/scale lookups for
/// one venue's connector.
pub struct MarketDataService {
    connector: Arc<dyn Connector>,
    symbol_map: HashMap<String, VenueSymbol>,
    decimal_cache: DashMap<String, (u32, u32)>,
    min_size_cache: DashMap<String, i64>,
    locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl MarketDataService {
    pub fn new(connector: Arc<dyn Connector>, symbol_map: HashMap<String, String>) -> Self {
        let symbol_map = symbol_map
            .into_iter()
            .map(|(canonical, venue)| (canonical.to_ascii_uppercase(), VenueSymbol(venue)))
            .collect();
        Self {
            connector,
            symbol_map,
            decimal_cache: DashMap::new(),
            min_size_cache: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn canonical_key(&self, symbol: &str) -> Result<String> {
        let key = symbol.to_ascii_uppercase();
        if self.symbol_map.contains_key(&key) {
            Ok(key)
        } else {
            Err(EngineError::UnknownSymbol(symbol.to_string()))
        }
    }

    /// Resolves a canonical symbol to its venue-specific spelling.
    pub fn resolve_symbol(&self, symbol: &str) -> Result<VenueSymbol> {
        let key = self.canonical_key(symbol)?;
        Ok(self.symbol_map[&key].clone())
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// `(price_decimals, size_decimals)`, memoized per canonical symbol.
    /// Concurrent callers on a cold cache coalesce onto exactly one
    /// connector call via a per-symbol lock and a double-checked read.
    pub async fn get_price_size_decimals(&self, symbol: &str) -> Result<(u32, u32)> {
        let key = self.canonical_key(symbol)?;
        if let Some(v) = self.decimal_cache.get(&key) {
            return Ok(*v);
        }
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;
        if let Some(v) = self.decimal_cache.get(&key) {
            return Ok(*v);
        }
        let venue_symbol = &self.symbol_map[&key];
        let decimals = self
            .connector
            .get_price_size_decimals(venue_symbol)
            .await
            .map_err(EngineError::Connector)?;
        self.decimal_cache.insert(key, decimals);
        Ok(decimals)
    }

    /// Minimum order size in integer base units, memoized identically to
    /// `get_price_size_decimals`.
    pub async fn get_min_size_i(&self, symbol: &str) -> Result<i64> {
        let key = self.canonical_key(symbol)?;
        if let Some(v) = self.min_size_cache.get(&key) {
            return Ok(*v);
        }
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;
        if let Some(v) = self.min_size_cache.get(&key) {
            return Ok(*v);
        }
        let venue_symbol = &self.symbol_map[&key];
        let min_size = self
            .connector
            .get_min_size_i(venue_symbol)
            .await
            .map_err(EngineError::Connector)?;
        self.min_size_cache.insert(key, min_size);
        Ok(min_size)
    }

    /// Converts a decimal price to the venue's integer price
    /// representation, truncating toward zero (`ROUND_DOWN`): never
    /// overstates what the caller asked for.
    pub async fn to_price_i(&self, symbol: &str, price: Decimal) -> Result<i64> {
        let (price_decimals, _) = self.get_price_size_decimals(symbol).await?;
        Ok(scale_truncate(price, price_decimals))
    }

    /// Converts a decimal size to the venue's integer size representation,
    /// same truncation policy as `to_price_i`.
    pub async fn to_size_i(&self, symbol: &str, size: Decimal) -> Result<i64> {
        let (_, size_decimals) = self.get_price_size_decimals(symbol).await?;
        Ok(scale_truncate(size, size_decimals))
    }

    /// Raises `RiskViolation`-free `UnknownSymbol`/below-minimum errors;
    /// callers treat this as a distinct risk-adjacent boundary check.
    pub async fn ensure_min_size(&self, symbol: &str, size_i: i64) -> Result<()> {
        let minimum = self.get_min_size_i(symbol).await?;
        if size_i < minimum {
            return Err(EngineError::RiskViolation(format!(
                "size {size_i} below minimum {minimum} for {symbol}"
            )));
        }
        Ok(())
    }

    /// Best bid/ask and shared scale for a canonical symbol.
    pub async fn get_top_of_book(
        &self,
        symbol: &str,
    ) -> Result<crate::connector::TopOfBookQuote> {
        let venue_symbol = self.resolve_symbol(symbol)?;
        self.connector
            .get_top_of_book(&venue_symbol)
            .await
            .map_err(EngineError::Connector)
    }

    pub fn canonical_symbols(&self) -> Vec<CanonicalSymbol> {
        self.symbol_map.keys().map(|k| CanonicalSymbol(k.clone())).collect()
    }

    pub fn venue(&self) -> &crate::core::types::VenueId {
        self.connector.venue()
    }
}

fn scale_truncate(value: Decimal, decimals: u32) -> i64 {
    let scale = Decimal::from(10i64).powi(decimals as i64);
    let scaled = (value * scale).trunc();
    match scaled.to_i64() {
        Some(v) => v,
        None if scaled.is_sign_negative() => i64::MIN,
        None => i64::MAX,
    }
}
