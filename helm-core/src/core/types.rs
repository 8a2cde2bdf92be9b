//! Shared value types used across the execution core.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn is_buy(self) -> bool {
        matches!(self, Side::Buy)
    }

    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Order type as submitted to a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order lifecycle state. A runtime enum rather than a typestate: the order
/// registry holds every order uniformly and updates arrive from more than
/// one concurrent source (strategy cancel, venue WS push, reconciliation
/// poll), which rules out consuming-self transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderState {
    Submitting,
    Open,
    PartiallyFilled,
    Filled,
    Cancelled,
    Failed,
}

impl OrderState {
    /// Terminal states no longer accept transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderState::Filled | OrderState::Cancelled | OrderState::Failed)
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Submitting => "submitting",
            OrderState::Open => "open",
            OrderState::PartiallyFilled => "partially_filled",
            OrderState::Filled => "filled",
            OrderState::Cancelled => "cancelled",
            OrderState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A venue identifier, e.g. `"crypto_com"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueId(pub String);

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VenueId {
    fn from(s: &str) -> Self {
        VenueId(s.to_string())
    }
}

/// A canonical symbol used by strategies and risk/position aggregation,
/// independent of any venue's wire spelling (e.g. `"BTC-USD"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalSymbol(pub String);

impl fmt::Display for CanonicalSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CanonicalSymbol {
    fn from(s: &str) -> Self {
        CanonicalSymbol(s.to_string())
    }
}

/// A venue's own spelling of a symbol (e.g. `"BTCUSD-PERP"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VenueSymbol(pub String);

impl fmt::Display for VenueSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for VenueSymbol {
    fn from(s: &str) -> Self {
        VenueSymbol(s.to_string())
    }
}

/// Top-of-book snapshot, scaled integer prices/sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub bid_price_i: i64,
    pub bid_size_i: i64,
    pub ask_price_i: i64,
    pub ask_size_i: i64,
    /// Monotonic sequence number or epoch millis from the venue, used only
    /// to detect staleness; no ordering guarantee is assumed across venues.
    pub ts_millis: i64,
}

impl TopOfBook {
    pub fn mid_price_i(&self) -> i64 {
        (self.bid_price_i + self.ask_price_i) / 2
    }

    /// The reference price used for notional risk checks: the side the
    /// order would cross against (ask for a buy, bid for a sell).
    pub fn far_side_reference(&self, side: Side) -> i64 {
        match side {
            Side::Buy => self.ask_price_i,
            Side::Sell => self.bid_price_i,
        }
    }
}

/// A single trade print, as recorded into the market cache's ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub price_i: i64,
    pub size_i: i64,
    pub side: Side,
    pub ts_millis: i64,
}

/// Aggregated balance for one asset on one venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub total_i: i64,
    pub available_i: i64,
    pub ts_millis: i64,
}
