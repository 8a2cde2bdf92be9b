//! Centralised order flow for a single venue: submission, cancellation,
//! update ingestion, and reconciliation.
//!
//! The registry is a `tokio::sync::Mutex<HashMap<u32, Order>>`:
//! register/lookup must interleave safely with concurrent submissions, but
//! each critical section is short enough that an async mutex (not
//! `DashMap`) is fine. Unlike the market-data/position caches, this isn't a
//! hot lookup path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::{Map, Value};
use tokio::sync::Mutex as AsyncMutex;

use crate::connector::{
    map_order_state_str, Connector, LimitOrderRequest, MarketOrderRequest, VenueOrderUpdate,
};
use crate::core::errors::EngineError;
use crate::core::ids::ClientOrderIdGenerator;
use crate::core::order::{Order, OrderEvent};
use crate::core::types::{CanonicalSymbol, OrderState};
use crate::market_data::MarketDataService;
use crate::monitoring::MetricsRegistry;
use crate::risk::RiskService;
use crate::Result;

/// An out-of-band update destined for a tracked order, as ingested from a
/// connector's push feed or a polled reconciliation read.
#[derive(Debug, Clone)]
pub struct OrderUpdatePayload {
    pub client_order_index: u32,
    pub state: OrderState,
    pub exchange_order_id: Option<String>,
    pub info: Map<String, Value>,
}

impl From<VenueOrderUpdate> for OrderUpdatePayload {
    fn from(u: VenueOrderUpdate) -> Self {
        Self {
            client_order_index: u.client_order_index,
            state: u.state,
            exchange_order_id: u.exchange_order_id,
            info: u.info,
        }
    }
}

/// Coordinates order submission, cancellation, and update ingestion
/// against one connector. Holds no tracking-limit state itself, that
/// lives in [`crate::tracking_limit::TrackingLimitEngine`], which is
/// handed a reference to this service to drive its reprice/cancel loop.
pub struct OrderService {
    connector: Arc<dyn Connector>,
    market_data: Arc<MarketDataService>,
    risk: Arc<RiskService>,
    log_root: Option<PathBuf>,
    generator: ClientOrderIdGenerator,
    orders: AsyncMutex<HashMap<u32, Order>>,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl OrderService {
    pub fn new(
        connector: Arc<dyn Connector>,
        market_data: Arc<MarketDataService>,
        risk: Arc<RiskService>,
        log_root: Option<PathBuf>,
    ) -> Self {
        Self {
            connector,
            market_data,
            risk,
            log_root,
            generator: ClientOrderIdGenerator::new(),
            orders: AsyncMutex::new(HashMap::new()),
            metrics: None,
        }
    }

    /// Attaches a metrics registry; order submission, terminal transitions,
    /// and cancellations are recorded against it from then on. Optional:
    /// a service with no registry simply skips recording.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record_terminal(&self, venue: &str, symbol: &str, side: &str, state: OrderState, filled_delta_i: i64) {
        let Some(metrics) = &self.metrics else { return };
        let orders = metrics.orders();
        orders.orders_open.with_label_values(&[venue, symbol]).dec();
        match state {
            OrderState::Filled => {
                orders
                    .orders_filled_total
                    .with_label_values(&[venue, symbol, side])
                    .inc();
                if filled_delta_i > 0 {
                    orders
                        .fill_volume_base_total
                        .with_label_values(&[venue, symbol, side])
                        .inc_by(filled_delta_i as f64);
                }
            }
            OrderState::Cancelled => {
                orders
                    .orders_cancelled_total
                    .with_label_values(&[venue, symbol, side])
                    .inc();
            }
            OrderState::Failed => {
                orders
                    .orders_failed_total
                    .with_label_values(&[venue, symbol, side])
                    .inc();
            }
            _ => {}
        }
    }

    async fn register(&self, order: Order) {
        self.orders.lock().await.insert(order.coi(), order);
    }

    /// Looks up a tracked order by client order index.
    pub async fn get(&self, client_order_index: u32) -> Result<Order> {
        self.orders
            .lock()
            .await
            .get(&client_order_index)
            .cloned()
            .ok_or(EngineError::UnknownOrder(client_order_index))
    }

    /// Submits a resting limit order. `size_i`/`price_i` are already
    /// fixed-point; callers holding `Decimal` quantities should scale via
    /// `MarketDataService::to_size_i`/`to_price_i` first. Scaling is the
    /// caller's responsibility, not this service's.
    pub async fn submit_limit(
        &self,
        symbol: &str,
        is_ask: bool,
        size_i: i64,
        price_i: i64,
        post_only: bool,
        reduce_only: bool,
        client_order_index: Option<u32>,
        trace_id: Option<String>,
    ) -> Result<Order> {
        self.risk
            .validate_order(symbol, size_i, is_ask, Some(price_i))
            .await?;

        let coi = client_order_index.unwrap_or_else(|| self.generator.next());
        let venue_symbol = self.market_data.resolve_symbol(symbol)?;
        let order = Order::new(
            self.connector.venue().clone(),
            CanonicalSymbol::from(symbol),
            coi,
            is_ask,
            size_i,
            Some(price_i),
            self.log_root.clone(),
            trace_id,
        );
        self.register(order.clone()).await;

        let mut submitting_info = Map::new();
        submitting_info.insert("size_i".into(), Value::from(size_i));
        submitting_info.insert("price_i".into(), Value::from(price_i));
        submitting_info.insert("is_ask".into(), Value::from(is_ask));
        order.apply_update(OrderEvent::new(OrderState::Submitting, submitting_info), None);

        let request = LimitOrderRequest {
            venue_symbol,
            client_order_index: coi,
            base_amount_i: size_i,
            price_i,
            is_ask,
            post_only,
            reduce_only,
        };
        let venue = self.connector.venue().to_string();
        let side = if is_ask { "sell" } else { "buy" };
        let exchange_order_id = match self.connector.submit_limit_order(request).await {
            Ok(id) => id,
            Err(err) => {
                let mut info = Map::new();
                info.insert("error".into(), Value::from(err.to_string()));
                order.apply_update(OrderEvent::new(OrderState::Failed, info), None);
                if let Some(metrics) = &self.metrics {
                    metrics
                        .orders()
                        .orders_failed_total
                        .with_label_values(&[&venue, symbol, side])
                        .inc();
                    metrics
                        .orders()
                        .connector_errors_total
                        .with_label_values(&[&venue, "submit_limit_order"])
                        .inc();
                }
                return Err(EngineError::Connector(err));
            }
        };

        let mut open_info = Map::new();
        open_info.insert(
            "exchange_order_id".into(),
            Value::from(exchange_order_id.clone()),
        );
        open_info.insert("size_i".into(), Value::from(size_i));
        open_info.insert("price_i".into(), Value::from(price_i));
        order.apply_update(
            OrderEvent::new(OrderState::Open, open_info),
            Some(exchange_order_id),
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .orders()
                .orders_submitted_total
                .with_label_values(&[&venue, symbol, side])
                .inc();
            metrics.orders().orders_open.with_label_values(&[&venue, symbol]).inc();
        }
        Ok(order)
    }

    /// Submits a market order. No `price_i` — fills are reported through
    /// `ingest_update` as they land.
    pub async fn submit_market(
        &self,
        symbol: &str,
        is_ask: bool,
        size_i: i64,
        reduce_only: bool,
        client_order_index: Option<u32>,
        trace_id: Option<String>,
    ) -> Result<Order> {
        self.risk.validate_order(symbol, size_i, is_ask, None).await?;

        let coi = client_order_index.unwrap_or_else(|| self.generator.next());
        let venue_symbol = self.market_data.resolve_symbol(symbol)?;
        let order = Order::new(
            self.connector.venue().clone(),
            CanonicalSymbol::from(symbol),
            coi,
            is_ask,
            size_i,
            None,
            self.log_root.clone(),
            trace_id,
        );
        self.register(order.clone()).await;

        let mut submitting_info = Map::new();
        submitting_info.insert("size_i".into(), Value::from(size_i));
        submitting_info.insert("is_ask".into(), Value::from(is_ask));
        order.apply_update(OrderEvent::new(OrderState::Submitting, submitting_info), None);

        let request = MarketOrderRequest {
            venue_symbol,
            client_order_index: coi,
            size_i,
            is_ask,
            reduce_only,
        };
        let venue = self.connector.venue().to_string();
        let side = if is_ask { "sell" } else { "buy" };
        let exchange_order_id = match self.connector.submit_market_order(request).await {
            Ok(id) => id,
            Err(err) => {
                let mut info = Map::new();
                info.insert("error".into(), Value::from(err.to_string()));
                order.apply_update(OrderEvent::new(OrderState::Failed, info), None);
                if let Some(metrics) = &self.metrics {
                    metrics
                        .orders()
                        .orders_failed_total
                        .with_label_values(&[&venue, symbol, side])
                        .inc();
                    metrics
                        .orders()
                        .connector_errors_total
                        .with_label_values(&[&venue, "submit_market_order"])
                        .inc();
                }
                return Err(EngineError::Connector(err));
            }
        };

        let mut open_info = Map::new();
        open_info.insert(
            "exchange_order_id".into(),
            Value::from(exchange_order_id.clone()),
        );
        open_info.insert("size_i".into(), Value::from(size_i));
        order.apply_update(
            OrderEvent::new(OrderState::Open, open_info),
            Some(exchange_order_id),
        );
        if let Some(metrics) = &self.metrics {
            metrics
                .orders()
                .orders_submitted_total
                .with_label_values(&[&venue, symbol, side])
                .inc();
            metrics.orders().orders_open.with_label_values(&[&venue, symbol]).inc();
        }
        Ok(order)
    }

    /// Cancels a tracked order by client order index. Asking the venue to
    /// cancel an already-terminal order is not treated as an error — the
    /// connector contract requires cancel to be idempotent; the resulting
    /// `Cancelled` event is a no-op against `Order::apply_update` if the
    /// order already settled some other way.
    pub async fn cancel(&self, symbol: &str, client_order_index: u32) -> Result<()> {
        let order = self.get(client_order_index).await?;
        let venue_symbol = self.market_data.resolve_symbol(symbol)?;
        self.connector
            .cancel_by_client_id(&venue_symbol, client_order_index)
            .await
            .map_err(EngineError::Connector)?;
        let mut info = Map::new();
        info.insert("symbol".into(), Value::from(symbol));
        info.insert("client_order_index".into(), Value::from(client_order_index));
        let side = if order.is_ask() { "sell" } else { "buy" };
        let applied = order.apply_update(OrderEvent::new(OrderState::Cancelled, info), None);
        if applied {
            self.record_terminal(
                &self.connector.venue().to_string(),
                symbol,
                side,
                OrderState::Cancelled,
                0,
            );
        }
        Ok(())
    }

    /// Applies an externally-observed update (from a push feed or a
    /// reconciliation poll) to the matching tracked order.
    pub async fn ingest_update(&self, payload: OrderUpdatePayload) -> Result<Order> {
        let order = self.get(payload.client_order_index).await?;
        let filled_before = order.filled_base_i();
        let state = payload.state;
        let applied = order.apply_update(
            OrderEvent::new(state, payload.info),
            payload.exchange_order_id,
        );
        if applied {
            let venue = self.connector.venue().to_string();
            let symbol = order.canonical_symbol().0.clone();
            let side = if order.is_ask() { "sell" } else { "buy" };
            if let Some(metrics) = &self.metrics {
                if state == OrderState::PartiallyFilled {
                    metrics
                        .orders()
                        .orders_partially_filled_total
                        .with_label_values(&[&venue, &symbol, side])
                        .inc();
                }
            }
            if state.is_terminal() {
                let filled_delta = (order.filled_base_i() - filled_before).max(0);
                self.record_terminal(&venue, &symbol, side, state, filled_delta);
            }
        }
        Ok(order)
    }

    /// Polls the connector for the current venue-side state of a tracked
    /// order and reconciles it (spec.md §4.5's "diagnostic reconciliation"
    /// path, distinct from the push-feed path `ingest_update` serves).
    pub async fn fetch_order(&self, symbol: &str, client_order_index: u32) -> Result<Order> {
        let venue_symbol = self.market_data.resolve_symbol(symbol)?;
        let snapshot = self
            .connector
            .get_order(&venue_symbol, client_order_index)
            .await
            .map_err(EngineError::Connector)?;
        let state = map_order_state_str(&snapshot.state_raw).ok_or_else(|| {
            EngineError::Connector(anyhow::anyhow!(
                "connector returned unrecognized order state {:?}",
                snapshot.state_raw
            ))
        })?;
        self.ingest_update(OrderUpdatePayload {
            client_order_index,
            state,
            exchange_order_id: snapshot.exchange_order_id,
            info: snapshot.info,
        })
        .await
    }

    pub fn market_data(&self) -> &Arc<MarketDataService> {
        &self.market_data
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }

    /// Converts a decimal size/price to fixed-point for `symbol`, for
    /// callers that only have human-entered quantities.
    pub async fn to_size_i(&self, symbol: &str, size: Decimal) -> Result<i64> {
        self.market_data.to_size_i(symbol, size).await
    }

    pub async fn to_price_i(&self, symbol: &str, price: Decimal) -> Result<i64> {
        self.market_data.to_price_i(symbol, price).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{TopOfBookQuote, VenueOrderSnapshot, VenuePosition};
    use crate::core::types::VenueId;
    use crate::position::PositionService;
    use crate::risk::RiskLimits;
    use async_trait::async_trait;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct MockConnector {
        venue: VenueId,
        fail_submit: bool,
        next_id: AtomicU32,
    }

    #[async_trait]
    impl Connector for MockConnector {
        fn venue(&self) -> &VenueId {
            &self.venue
        }
        async fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_price_size_decimals(
            &self,
            _s: &crate::core::types::VenueSymbol,
        ) -> anyhow::Result<(u32, u32)> {
            Ok((2, 3))
        }
        async fn get_min_size_i(&self, _s: &crate::core::types::VenueSymbol) -> anyhow::Result<i64> {
            Ok(1)
        }
        async fn get_top_of_book(
            &self,
            _s: &crate::core::types::VenueSymbol,
        ) -> anyhow::Result<TopOfBookQuote> {
            Ok(TopOfBookQuote {
                bid_i: Some(10000),
                ask_i: Some(10010),
                scale: 100,
            })
        }
        async fn submit_limit_order(&self, _r: LimitOrderRequest) -> anyhow::Result<String> {
            if self.fail_submit {
                anyhow::bail!("venue rejected order")
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(format!("ex-{id}"))
        }
        async fn submit_market_order(&self, _r: MarketOrderRequest) -> anyhow::Result<String> {
            if self.fail_submit {
                anyhow::bail!("venue rejected order")
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(format!("ex-{id}"))
        }
        async fn cancel_by_client_id(
            &self,
            _s: &crate::core::types::VenueSymbol,
            _c: u32,
        ) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_order(
            &self,
            _s: &crate::core::types::VenueSymbol,
            _c: u32,
        ) -> anyhow::Result<VenueOrderSnapshot> {
            Ok(VenueOrderSnapshot {
                state_raw: "filled".to_string(),
                exchange_order_id: Some("ex-9".to_string()),
                info: Map::new(),
            })
        }
        async fn get_positions(&self) -> anyhow::Result<Vec<VenuePosition>> {
            Ok(vec![])
        }
        async fn get_margin(&self) -> anyhow::Result<Map<String, Value>> {
            Ok(Map::new())
        }
    }

    fn service(fail_submit: bool) -> OrderService {
        let connector = Arc::new(MockConnector {
            venue: VenueId::from("v1"),
            fail_submit,
            next_id: AtomicU32::new(1),
        });
        let mut map = StdHashMap::new();
        map.insert("SOL".to_string(), "SOL_USDC_PERP".to_string());
        let market_data = Arc::new(MarketDataService::new(connector.clone(), map));
        let position_service = Arc::new(PositionService::new());
        let risk = Arc::new(RiskService::new(
            market_data.clone(),
            position_service,
            RiskLimits::default(),
        ));
        OrderService::new(connector, market_data, risk, None)
    }

    #[tokio::test]
    async fn submit_limit_transitions_submitting_then_open() {
        let svc = service(false);
        let order = svc
            .submit_limit("SOL", false, 1000, 10_000, false, false, None, None)
            .await
            .unwrap();
        assert_eq!(order.state(), OrderState::Open);
        assert_eq!(order.exchange_order_id().as_deref(), Some("ex-1"));
        assert_eq!(order.history().len(), 2);
    }

    #[tokio::test]
    async fn submit_limit_marks_failed_on_connector_error() {
        let svc = service(true);
        let err = svc
            .submit_limit("SOL", false, 1000, 10_000, false, false, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Connector(_)));
    }

    #[tokio::test]
    async fn cancel_unknown_order_errors() {
        let svc = service(false);
        let err = svc.cancel("SOL", 999).await.unwrap_err();
        assert!(matches!(err, EngineError::UnknownOrder(999)));
    }

    #[tokio::test]
    async fn ingest_update_reaches_registered_order() {
        let svc = service(false);
        let order = svc
            .submit_market("SOL", false, 1000, false, None, None)
            .await
            .unwrap();
        let coi = order.coi();
        let mut info = Map::new();
        info.insert("filled_base_i".into(), Value::from(1000));
        svc.ingest_update(OrderUpdatePayload {
            client_order_index: coi,
            state: OrderState::Filled,
            exchange_order_id: None,
            info,
        })
        .await
        .unwrap();
        assert_eq!(order.state(), OrderState::Filled);
        assert_eq!(order.filled_base_i(), 1000);
    }

    #[tokio::test]
    async fn fetch_order_reconciles_from_connector() {
        let svc = service(false);
        let order = svc
            .submit_market("SOL", false, 1000, false, None, None)
            .await
            .unwrap();
        let coi = order.coi();
        let reconciled = svc.fetch_order("SOL", coi).await.unwrap();
        assert_eq!(reconciled.state(), OrderState::Filled);
    }
}
