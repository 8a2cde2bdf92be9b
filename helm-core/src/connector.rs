//! The connector contract: an async abstraction over one exchange.
//!
//! Grounded on `xbot/connector/interface.py::IConnector` for the exact
//! method set, generalized from a Python `Protocol` to an `async_trait`
//! object-safe trait so the lifecycle controller and order service can
//! hold `Arc<dyn Connector>` without knowing the concrete venue. Per-venue
//! wire protocols (REST signing, websocket framing) stay out of this
//! crate entirely — `helm-connectors` supplies the one reference
//! implementation spec.md §1 treats as a black box.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::core::types::{OrderState, VenueId, VenueSymbol};

/// A request to place a resting limit order.
#[derive(Debug, Clone)]
pub struct LimitOrderRequest {
    pub venue_symbol: VenueSymbol,
    pub client_order_index: u32,
    pub base_amount_i: i64,
    pub price_i: i64,
    pub is_ask: bool,
    pub post_only: bool,
    pub reduce_only: bool,
}

/// A request to place a market order.
#[derive(Debug, Clone)]
pub struct MarketOrderRequest {
    pub venue_symbol: VenueSymbol,
    pub client_order_index: u32,
    pub size_i: i64,
    pub is_ask: bool,
    pub reduce_only: bool,
}

/// Best bid/ask plus the shared integer scale factor for one venue symbol.
/// Either side may be `None` if the book is empty on that side.
#[derive(Debug, Clone, Copy, Default)]
pub struct TopOfBookQuote {
    pub bid_i: Option<i64>,
    pub ask_i: Option<i64>,
    pub scale: i64,
}

/// Raw snapshot returned by `get_order`, narrowed just enough to drive
/// reconciliation: everything else (fees, timestamps, venue-specific
/// fields) is preserved under `info` for logging, never read for control
/// flow (spec.md §9 "Dynamic-status payloads").
#[derive(Debug, Clone)]
pub struct VenueOrderSnapshot {
    pub state_raw: String,
    pub exchange_order_id: Option<String>,
    pub info: Map<String, Value>,
}

/// An out-of-band order update pushed by a connector's background stream,
/// destined for `OrderService::ingest_update`.
#[derive(Debug, Clone)]
pub struct VenueOrderUpdate {
    pub client_order_index: u32,
    pub state: OrderState,
    pub exchange_order_id: Option<String>,
    pub info: Map<String, Value>,
}

/// One venue position, in whatever schema the venue exposes. Canonical
/// symbol resolution and `PositionSnapshot` construction happen one layer
/// up, since the connector only knows its own wire spelling.
#[derive(Debug, Clone)]
pub struct VenuePosition {
    pub venue_symbol: String,
    pub base_qty: rust_decimal::Decimal,
    pub quote_value: rust_decimal::Decimal,
    pub notional: rust_decimal::Decimal,
    pub raw: Map<String, Value>,
}

/// Maps a venue status string (case-insensitive) onto `OrderState`. Shared
/// by connector implementations mapping their own wire vocabulary and by
/// `OrderService::fetch_order`'s reconciliation path (spec.md §4.5).
pub fn map_order_state_str(raw: &str) -> Option<OrderState> {
    match raw.to_ascii_lowercase().as_str() {
        "new" | "submitting" | "pending" => Some(OrderState::Submitting),
        "open" | "accepted" | "live" | "working" | "resting" => Some(OrderState::Open),
        "partially_filled" | "partial" | "partial_fill" => Some(OrderState::PartiallyFilled),
        "filled" | "closed" | "done" | "fully_filled" => Some(OrderState::Filled),
        "cancelled" | "canceled" | "cancel" => Some(OrderState::Cancelled),
        "failed" | "rejected" | "expired" | "error" => Some(OrderState::Failed),
        _ => None,
    }
}

/// Async abstraction over one exchange. Submission must be atomic from the
/// caller's viewpoint: either it returns an exchange id (the order is live
/// at the venue) or it raises, and the engine treats the raise as `FAILED`
/// with no open-order leak. A connector that cannot itself guarantee this
/// must query-and-cancel on ambiguous outcomes before surfacing the error.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The venue identifier this connector speaks for.
    fn venue(&self) -> &VenueId;

    /// Connects all underlying transports and bootstraps state.
    async fn start(&self) -> anyhow::Result<()>;

    /// Tears down transports and releases resources. Idempotent.
    async fn stop(&self) -> anyhow::Result<()>;

    /// `(price_decimals, size_decimals)` for a venue-specific symbol.
    async fn get_price_size_decimals(&self, symbol: &VenueSymbol) -> anyhow::Result<(u32, u32)>;

    /// Minimum order size, in integer base units.
    async fn get_min_size_i(&self, symbol: &VenueSymbol) -> anyhow::Result<i64>;

    /// Best bid/ask and the shared price scale.
    async fn get_top_of_book(&self, symbol: &VenueSymbol) -> anyhow::Result<TopOfBookQuote>;

    /// Places a limit order, returning the exchange-assigned order id.
    async fn submit_limit_order(&self, request: LimitOrderRequest) -> anyhow::Result<String>;

    /// Places a market order, returning the exchange-assigned order id.
    async fn submit_market_order(&self, request: MarketOrderRequest) -> anyhow::Result<String>;

    /// Cancels by client order index. Idempotent: cancelling an
    /// already-terminal order is not an error.
    async fn cancel_by_client_id(
        &self,
        symbol: &VenueSymbol,
        client_order_index: u32,
    ) -> anyhow::Result<()>;

    /// Cancels by exchange order id, when the venue supports it.
    async fn cancel_by_order_id(
        &self,
        _symbol: &VenueSymbol,
        _exchange_order_id: &str,
    ) -> anyhow::Result<()> {
        anyhow::bail!("cancel_by_order_id not supported by this connector")
    }

    /// Fetches the latest order state for reconciliation/diagnostics.
    async fn get_order(
        &self,
        symbol: &VenueSymbol,
        client_order_index: u32,
    ) -> anyhow::Result<VenueOrderSnapshot>;

    /// Current open positions, in venue-native schema.
    async fn get_positions(&self) -> anyhow::Result<Vec<VenuePosition>>;

    /// Current margin snapshot, in venue-native schema.
    async fn get_margin(&self) -> anyhow::Result<Map<String, Value>>;

    /// Takes ownership of the receiving half of this connector's
    /// background order-update stream, if it runs one. Returns `None` for
    /// connectors with no push feed (e.g. a diagnostic/poll-only
    /// connector) and on any call after the first.
    fn take_update_receiver(&self) -> Option<UnboundedReceiver<VenueOrderUpdate>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_common_status_strings_case_insensitively() {
        assert_eq!(map_order_state_str("OPEN"), Some(OrderState::Open));
        assert_eq!(map_order_state_str("Filled"), Some(OrderState::Filled));
        assert_eq!(
            map_order_state_str("partially_filled"),
            Some(OrderState::PartiallyFilled)
        );
        assert_eq!(map_order_state_str("canceled"), Some(OrderState::Cancelled));
        assert_eq!(map_order_state_str("rejected"), Some(OrderState::Failed));
        assert_eq!(map_order_state_str("whatever-this-is"), None);
    }
}
