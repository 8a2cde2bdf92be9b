//! A stateless façade over the five services and the market cache, so a
//! strategy binds to one object instead of wiring services itself.
//!
//! Grounded on spec.md §4.8: thin delegating methods plus accessors. No
//! behavior of its own — every call forwards to `OrderService`,
//! `TrackingLimitEngine`, `RiskService`, `PositionService`,
//! `MarketDataService`, or `MarketCache`.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::market_cache::MarketCache;
use crate::market_data::MarketDataService;
use crate::order_service::OrderService;
use crate::position::PositionService;
use crate::risk::RiskService;
use crate::tracking_limit::{TrackingLimitEngine, TrackingLimitOrder, TrackingLimitParams};
use crate::{Order, Result};

/// Single entry point strategies and the CLI hold instead of assembling
/// `OrderService`/`RiskService`/`TrackingLimitEngine`/caches by hand.
pub struct ExecutionRouter {
    order_service: Arc<OrderService>,
    tracking_engine: Arc<TrackingLimitEngine>,
    risk_service: Arc<RiskService>,
    position_service: Arc<PositionService>,
    market_data: Arc<MarketDataService>,
    cache: Arc<MarketCache>,
}

impl ExecutionRouter {
    pub fn new(
        order_service: Arc<OrderService>,
        tracking_engine: Arc<TrackingLimitEngine>,
        risk_service: Arc<RiskService>,
        position_service: Arc<PositionService>,
        market_data: Arc<MarketDataService>,
        cache: Arc<MarketCache>,
    ) -> Self {
        Self {
            order_service,
            tracking_engine,
            risk_service,
            position_service,
            market_data,
            cache,
        }
    }

    pub async fn submit_limit(
        &self,
        symbol: &str,
        is_ask: bool,
        size_i: i64,
        price_i: i64,
        post_only: bool,
        reduce_only: bool,
        trace_id: Option<String>,
    ) -> Result<Order> {
        self.order_service
            .submit_limit(
                symbol, is_ask, size_i, price_i, post_only, reduce_only, None, trace_id,
            )
            .await
    }

    pub async fn submit_market(
        &self,
        symbol: &str,
        is_ask: bool,
        size_i: i64,
        reduce_only: bool,
        trace_id: Option<String>,
    ) -> Result<Order> {
        self.order_service
            .submit_market(symbol, is_ask, size_i, reduce_only, None, trace_id)
            .await
    }

    pub async fn cancel(&self, symbol: &str, client_order_index: u32) -> Result<()> {
        self.order_service.cancel(symbol, client_order_index).await
    }

    pub async fn tracking_limit(
        &self,
        symbol: &str,
        base_amount_i: i64,
        is_ask: bool,
        params: TrackingLimitParams,
    ) -> Result<TrackingLimitOrder> {
        self.tracking_engine
            .place(&self.order_service, symbol, base_amount_i, is_ask, params)
            .await
    }

    pub async fn fetch_order(&self, symbol: &str, client_order_index: u32) -> Result<Order> {
        self.order_service.fetch_order(symbol, client_order_index).await
    }

    pub async fn to_size_i(&self, symbol: &str, size: Decimal) -> Result<i64> {
        self.market_data.to_size_i(symbol, size).await
    }

    pub async fn to_price_i(&self, symbol: &str, price: Decimal) -> Result<i64> {
        self.market_data.to_price_i(symbol, price).await
    }

    pub fn risk(&self) -> &Arc<RiskService> {
        &self.risk_service
    }

    pub fn positions(&self) -> &Arc<PositionService> {
        &self.position_service
    }

    pub fn orders(&self) -> &Arc<OrderService> {
        &self.order_service
    }

    pub fn market_data(&self) -> &Arc<MarketDataService> {
        &self.market_data
    }

    pub fn cache(&self) -> &Arc<MarketCache> {
        &self.cache
    }

    pub async fn wait_order_final(
        &self,
        client_order_index: u32,
        timeout: Option<Duration>,
    ) -> Result<Option<crate::core::types::OrderState>> {
        let order = self.order_service.get(client_order_index).await?;
        Ok(order.wait_final(timeout).await)
    }
}
