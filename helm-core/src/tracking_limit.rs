//! Tracking-limit repricing: place-at-reference, wait, reprice-or-cancel
//! until filled, timed out, or attempts exhausted.
//!
//! Grounded on `xbot/execution/tracking_limit.py::TrackingLimitEngine`.
//! Each attempt resubmits via `OrderService::submit_limit` rather than
//! amending in place (spec.md §4.6: "no venues in scope support in-place
//! amend") and waits for either a terminal resolution or the per-attempt
//! interval; on interval expiry the order is cancelled and given a short
//! grace period to settle before moving to the next attempt at a fresh
//! reference price.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::core::errors::EngineError;
use crate::core::order::{extract_filled_i64, Order};
use crate::core::types::OrderState;
use crate::market_data::MarketDataService;
use crate::monitoring::MetricsRegistry;
use crate::order_service::OrderService;
use crate::Result;

/// One placement attempt within a tracking-limit run.
#[derive(Debug, Clone)]
pub struct TrackingAttempt {
    pub attempt: u32,
    pub client_order_index: u32,
    pub price_i: i64,
    pub state: OrderState,
    pub info: Map<String, Value>,
}

/// The outcome of a completed (or exhausted) tracking-limit run.
pub struct TrackingLimitOrder {
    pub order: Order,
    pub attempts: Vec<TrackingAttempt>,
    pub filled_base_i: i64,
}

impl TrackingLimitOrder {
    pub fn attempts_count(&self) -> usize {
        self.attempts.len()
    }

    pub async fn wait_final(&self, timeout: Option<Duration>) -> Option<OrderState> {
        self.order.wait_final(timeout).await
    }
}

/// Tunables for one `place` call. Fields default to the engine's own
/// defaults (spec.md §4.6) when left `None`/`0`.
#[derive(Debug, Clone, Default)]
pub struct TrackingLimitParams {
    pub interval_secs: Option<f64>,
    pub timeout_secs: Option<f64>,
    pub price_offset_ticks: i64,
    pub max_attempts: Option<u32>,
    pub post_only: bool,
    pub reduce_only: bool,
    pub trace_id: Option<String>,
}

pub struct TrackingLimitEngine {
    market_data: Arc<MarketDataService>,
    default_interval: Duration,
    default_timeout: Duration,
    cancel_wait: Duration,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl TrackingLimitEngine {
    pub fn new(market_data: Arc<MarketDataService>) -> Self {
        Self {
            market_data,
            default_interval: Duration::from_secs_f64(10.0),
            default_timeout: Duration::from_secs_f64(120.0),
            cancel_wait: Duration::from_secs_f64(2.0),
            metrics: None,
        }
    }

    pub fn with_defaults(
        market_data: Arc<MarketDataService>,
        default_interval: Duration,
        default_timeout: Duration,
        cancel_wait: Duration,
    ) -> Self {
        Self {
            market_data,
            default_interval,
            default_timeout,
            cancel_wait,
            metrics: None,
        }
    }

    /// Attaches a metrics registry; each attempt, timeout, and
    /// timeout-driven cancellation is recorded against it.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record_timeout(&self, venue: &str, symbol: &str, side: &str) {
        if let Some(metrics) = &self.metrics {
            metrics
                .tracking_limit()
                .timeouts_total
                .with_label_values(&[venue, symbol, side])
                .inc();
        }
    }

    /// Runs the repricing loop to completion. Returns
    /// `EngineError::TrackingLimitTimeout` if the deadline or attempt
    /// budget is exhausted with no fill, and `EngineError::Connector` if a
    /// placed order transitions to `Failed`.
    pub async fn place(
        &self,
        order_service: &OrderService,
        symbol: &str,
        base_amount_i: i64,
        is_ask: bool,
        params: TrackingLimitParams,
    ) -> Result<TrackingLimitOrder> {
        let interval = params
            .interval_secs
            .map(Duration::from_secs_f64)
            .unwrap_or(self.default_interval);
        let timeout = params
            .timeout_secs
            .map(Duration::from_secs_f64)
            .unwrap_or(self.default_timeout);
        let deadline = Instant::now() + timeout;
        let mut attempt = 0u32;
        let mut cumulative_filled = 0i64;
        let mut remaining = base_amount_i;
        let mut records = Vec::new();
        let dust_threshold = (base_amount_i / 10_000).max(1);
        let venue = self.market_data.venue().to_string();
        let side = if is_ask { "sell" } else { "buy" };

        loop {
            attempt += 1;
            if let Some(metrics) = &self.metrics {
                metrics
                    .tracking_limit()
                    .attempts_total
                    .with_label_values(&[&venue, symbol, side])
                    .inc();
            }
            if let Some(max_attempts) = params.max_attempts {
                if attempt > max_attempts {
                    self.record_timeout(&venue, symbol, side);
                    return Err(EngineError::TrackingLimitTimeout(
                        "max attempts reached before fill".to_string(),
                    ));
                }
            }
            let now = Instant::now();
            if now >= deadline {
                self.record_timeout(&venue, symbol, side);
                return Err(EngineError::TrackingLimitTimeout(
                    "tracking limit timeout reached".to_string(),
                ));
            }

            let quote = self.market_data.get_top_of_book(symbol).await?;
            let reference = if is_ask { quote.ask_i } else { quote.bid_i };
            let reference = reference.ok_or_else(|| {
                EngineError::TrackingLimitTimeout(
                    "top of book unavailable for tracking limit".to_string(),
                )
            })?;
            let price_i = if is_ask {
                reference + params.price_offset_ticks
            } else {
                reference - params.price_offset_ticks
            };
            if price_i <= 0 {
                return Err(EngineError::TrackingLimitTimeout(
                    "price offset results in a non-positive price".to_string(),
                ));
            }

            let order = order_service
                .submit_limit(
                    symbol,
                    is_ask,
                    remaining,
                    price_i,
                    params.post_only,
                    params.reduce_only,
                    None,
                    params.trace_id.clone(),
                )
                .await?;

            let wait_budget = interval.min(deadline.saturating_duration_since(Instant::now()));
            match order.wait_final(Some(wait_budget)).await {
                None => {
                    if let Some(metrics) = &self.metrics {
                        metrics
                            .tracking_limit()
                            .cancellations_total
                            .with_label_values(&[&venue, symbol, side])
                            .inc();
                    }
                    order_service.cancel(symbol, order.coi()).await?;
                    let update = match order.wait_final(Some(self.cancel_wait)).await {
                        Some(_) => order.snapshot(),
                        None => {
                            let mut snap = order.snapshot();
                            snap.info.insert("cancel_wait_timeout".into(), Value::from(true));
                            snap
                        }
                    };
                    let mut info = update.info.clone();
                    info.insert("timeout".into(), Value::from(true));
                    records.push(TrackingAttempt {
                        attempt,
                        client_order_index: order.coi(),
                        price_i,
                        state: update.state,
                        info,
                    });
                    let filled = extract_filled_i64(&update.info).unwrap_or(0);
                    cumulative_filled += filled;
                    remaining = base_amount_i - cumulative_filled;
                    if remaining <= dust_threshold {
                        return Ok(TrackingLimitOrder {
                            order,
                            attempts: records,
                            filled_base_i: cumulative_filled,
                        });
                    }
                    continue;
                }
                Some(state) => {
                    let update = order.snapshot();
                    records.push(TrackingAttempt {
                        attempt,
                        client_order_index: order.coi(),
                        price_i,
                        state,
                        info: update.info.clone(),
                    });
                    if state == OrderState::Filled {
                        cumulative_filled += remaining;
                        return Ok(TrackingLimitOrder {
                            order,
                            attempts: records,
                            filled_base_i: cumulative_filled,
                        });
                    }
                    if state == OrderState::Failed {
                        return Err(EngineError::Connector(anyhow::anyhow!(
                            "tracking limit attempt failed: {:?}",
                            update.info
                        )));
                    }
                    let filled = extract_filled_i64(&update.info).unwrap_or(0);
                    cumulative_filled += filled;
                    remaining = base_amount_i - cumulative_filled;
                    if remaining <= dust_threshold {
                        return Ok(TrackingLimitOrder {
                            order,
                            attempts: records,
                            filled_base_i: cumulative_filled,
                        });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        Connector, LimitOrderRequest, MarketOrderRequest, TopOfBookQuote, VenueOrderSnapshot,
        VenuePosition,
    };
    use crate::core::types::VenueId;
    use crate::position::PositionService;
    use crate::risk::{RiskLimits, RiskService};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::mpsc::{self, UnboundedSender};

    /// Reports every placed order's client-order-index back to the test so
    /// it can drive fills/timeouts through the real `ingest_update` path,
    /// rather than reaching into `Order` internals directly.
    struct ScriptedConnector {
        venue: VenueId,
        next_id: AtomicU32,
        placed: UnboundedSender<u32>,
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
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
            Ok((2, 0))
        }
        async fn get_min_size_i(&self, _s: &crate::core::types::VenueSymbol) -> anyhow::Result<i64> {
            Ok(1)
        }
        async fn get_top_of_book(
            &self,
            _s: &crate::core::types::VenueSymbol,
        ) -> anyhow::Result<TopOfBookQuote> {
            Ok(TopOfBookQuote {
                bid_i: Some(9990),
                ask_i: Some(10010),
                scale: 100,
            })
        }
        async fn submit_limit_order(&self, r: LimitOrderRequest) -> anyhow::Result<String> {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let _ = self.placed.send(r.client_order_index);
            Ok(format!("ex-{id}"))
        }
        async fn submit_market_order(&self, _r: MarketOrderRequest) -> anyhow::Result<String> {
            unimplemented!()
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
            unimplemented!()
        }
        async fn get_positions(&self) -> anyhow::Result<Vec<VenuePosition>> {
            Ok(vec![])
        }
        async fn get_margin(&self) -> anyhow::Result<Map<String, Value>> {
            Ok(Map::new())
        }
    }

    fn services() -> (Arc<OrderService>, Arc<MarketDataService>, mpsc::UnboundedReceiver<u32>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Arc::new(ScriptedConnector {
            venue: VenueId::from("v1"),
            next_id: AtomicU32::new(1),
            placed: tx,
        });
        let mut map = HashMap::new();
        map.insert("SOL".to_string(), "SOL_USDC_PERP".to_string());
        let market_data = Arc::new(MarketDataService::new(connector.clone(), map));
        let position_service = Arc::new(PositionService::new());
        let risk = Arc::new(RiskService::new(
            market_data.clone(),
            position_service,
            RiskLimits::default(),
        ));
        (
            Arc::new(OrderService::new(connector, market_data.clone(), risk, None)),
            market_data,
            rx,
        )
    }

    #[tokio::test]
    async fn fills_on_first_attempt_reports_one_attempt() {
        let (order_service, market_data, mut placed) = services();
        let engine = TrackingLimitEngine::with_defaults(
            market_data,
            Duration::from_millis(200),
            Duration::from_secs(5),
            Duration::from_millis(50),
        );
        let os = order_service.clone();
        let driver = tokio::spawn(async move {
            let coi = placed.recv().await.expect("order placed");
            let mut info = Map::new();
            info.insert("filled_base_i".into(), Value::from(100));
            os.ingest_update(crate::order_service::OrderUpdatePayload {
                client_order_index: coi,
                state: OrderState::Filled,
                exchange_order_id: None,
                info,
            })
            .await
            .unwrap();
        });

        let result = engine
            .place(
                &order_service,
                "SOL",
                100,
                false,
                TrackingLimitParams::default(),
            )
            .await
            .unwrap();
        driver.await.unwrap();

        assert_eq!(result.attempts_count(), 1);
        assert_eq!(result.filled_base_i, 100);
        assert_eq!(result.order.state(), OrderState::Filled);
    }

    #[tokio::test]
    async fn times_out_when_deadline_passes_with_no_fill() {
        let (order_service, market_data, _placed) = services();
        let engine = TrackingLimitEngine::with_defaults(
            market_data,
            Duration::from_millis(15),
            Duration::from_millis(50),
            Duration::from_millis(10),
        );
        let err = engine
            .place(
                &order_service,
                "SOL",
                100,
                false,
                TrackingLimitParams::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TrackingLimitTimeout(_)));
    }

    #[test]
    fn dust_threshold_is_never_zero_for_tiny_orders() {
        let base_amount_i = 5i64;
        let dust = (base_amount_i / 10_000).max(1);
        assert_eq!(dust, 1);
    }
}
