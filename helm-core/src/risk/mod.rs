//! Pre-trade risk validation: minimum size, net position cap, notional cap.
//!
//! Grounded on `xbot/execution/risk_service.py` for the exact check
//! ordering and the far-side-price notional rule (a buy looks at the ask,
//! a sell looks at the bid). Narrowed to the single `RiskViolation` error
//! kind spec.md §7 defines — there is no kill-switch/margin/connection-
//! health layer here since this crate has no account-health feed of its
//! own; a connector's own failures surface as `EngineError::Connector`.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::core::errors::EngineError;
use crate::market_data::MarketDataService;
use crate::monitoring::MetricsRegistry;
use crate::position::PositionService;
use crate::Result;

/// Optional pre-trade limits. `None` disables the corresponding check.
#[derive(Debug, Clone, Default)]
pub struct RiskLimits {
    pub max_position: Option<Decimal>,
    pub max_notional: Option<Decimal>,
}

/// Pre-trade validation ordered per spec.md §4.3: minimum size, then
/// position cap, then notional cap.
pub struct RiskService {
    market_data: Arc<MarketDataService>,
    position_service: Arc<PositionService>,
    limits: RiskLimits,
    metrics: Option<Arc<MetricsRegistry>>,
}

impl RiskService {
    pub fn new(
        market_data: Arc<MarketDataService>,
        position_service: Arc<PositionService>,
        limits: RiskLimits,
    ) -> Self {
        Self {
            market_data,
            position_service,
            limits,
            metrics: None,
        }
    }

    /// Attaches a metrics registry; rejected checks record
    /// `risk_violations_total` labeled by the rule that fired.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn record_violation(&self, symbol: &str, rule: &str) {
        if let Some(metrics) = &self.metrics {
            let venue = self.market_data.venue().to_string();
            metrics
                .risk()
                .risk_violations_total
                .with_label_values(&[&venue, symbol, rule])
                .inc();
        }
    }

    /// Validates a prospective order. `price_i` is required for the
    /// notional check only when the order is a limit order at a known
    /// price; market orders (and limit orders where the caller omits it)
    /// fall back to top-of-book's far side.
    pub async fn validate_order(
        &self,
        symbol: &str,
        size_i: i64,
        is_ask: bool,
        price_i: Option<i64>,
    ) -> Result<()> {
        if let Err(e) = self.market_data.ensure_min_size(symbol, size_i).await {
            self.record_violation(symbol, "min_size");
            return Err(e);
        }

        if self.limits.max_position.is_none() && self.limits.max_notional.is_none() {
            return Ok(());
        }

        let (price_decimals, size_decimals) =
            self.market_data.get_price_size_decimals(symbol).await?;
        let size = Decimal::from(size_i) / Decimal::from(10i64).powi(size_decimals as i64);

        if let Some(max_position) = self.limits.max_position {
            let existing = self
                .position_service
                .get_position(symbol)
                .map(|s| s.base_qty)
                .unwrap_or(Decimal::ZERO);
            let future_base = if is_ask {
                existing - size
            } else {
                existing + size
            };
            if future_base.abs() > max_position {
                self.record_violation(symbol, "position_cap");
                return Err(EngineError::RiskViolation(format!(
                    "net base {future_base} exceeds limit {max_position} for {symbol}"
                )));
            }
        }

        if let Some(max_notional) = self.limits.max_notional {
            let price_i = match price_i {
                Some(p) => p,
                None => {
                    let quote = self.market_data.get_top_of_book(symbol).await?;
                    let reference = if is_ask { quote.bid_i } else { quote.ask_i };
                    reference.ok_or_else(|| {
                        EngineError::RiskViolation(
                            "unable to determine reference price for notional risk check"
                                .to_string(),
                        )
                    })?
                }
            };
            let price = Decimal::from(price_i) / Decimal::from(10i64).powi(price_decimals as i64);
            let notional = price * size;
            if notional > max_notional {
                self.record_violation(symbol, "notional_cap");
                return Err(EngineError::RiskViolation(format!(
                    "order notional {notional} exceeds limit {max_notional}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        Connector, LimitOrderRequest, MarketOrderRequest, TopOfBookQuote, VenueOrderSnapshot,
        VenuePosition,
    };
    use crate::core::types::{CanonicalSymbol, VenueId, VenueSymbol};
    use crate::position::PositionSnapshot;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::{Map, Value};
    use std::collections::HashMap;

    struct StubConnector {
        venue: VenueId,
    }

    #[async_trait]
    impl Connector for StubConnector {
        fn venue(&self) -> &VenueId {
            &self.venue
        }
        async fn start(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_price_size_decimals(&self, _s: &VenueSymbol) -> anyhow::Result<(u32, u32)> {
            Ok((2, 3))
        }
        async fn get_min_size_i(&self, _s: &VenueSymbol) -> anyhow::Result<i64> {
            Ok(1)
        }
        async fn get_top_of_book(&self, _s: &VenueSymbol) -> anyhow::Result<TopOfBookQuote> {
            Ok(TopOfBookQuote {
                bid_i: Some(10000),
                ask_i: Some(10010),
                scale: 100,
            })
        }
        async fn submit_limit_order(&self, _r: LimitOrderRequest) -> anyhow::Result<String> {
            unimplemented!()
        }
        async fn submit_market_order(&self, _r: MarketOrderRequest) -> anyhow::Result<String> {
            unimplemented!()
        }
        async fn cancel_by_client_id(&self, _s: &VenueSymbol, _c: u32) -> anyhow::Result<()> {
            Ok(())
        }
        async fn get_order(&self, _s: &VenueSymbol, _c: u32) -> anyhow::Result<VenueOrderSnapshot> {
            unimplemented!()
        }
        async fn get_positions(&self) -> anyhow::Result<Vec<VenuePosition>> {
            Ok(vec![])
        }
        async fn get_margin(&self) -> anyhow::Result<Map<String, Value>> {
            Ok(Map::new())
        }
    }

    fn services(limits: RiskLimits) -> (Arc<MarketDataService>, Arc<PositionService>, RiskService) {
        let mut map = HashMap::new();
        map.insert("SOL".to_string(), "SOL_USDC_PERP".to_string());
        let connector = Arc::new(StubConnector {
            venue: VenueId::from("v1"),
        });
        let md = Arc::new(MarketDataService::new(connector, map));
        let pos = Arc::new(PositionService::new());
        let risk = RiskService::new(md.clone(), pos.clone(), limits);
        (md, pos, risk)
    }

    #[tokio::test]
    async fn rejects_below_min_size() {
        let (_md, _pos, risk) = services(RiskLimits::default());
        let err = risk.validate_order("SOL", 0, false, None).await.unwrap_err();
        assert!(matches!(err, EngineError::RiskViolation(_)));
    }

    #[tokio::test]
    async fn rejects_when_position_cap_exceeded() {
        let (_md, pos, risk) = services(RiskLimits {
            max_position: Some(dec!(1.0)),
            max_notional: None,
        });
        pos.ingest(PositionSnapshot {
            canonical_symbol: CanonicalSymbol::from("SOL"),
            base_qty: dec!(0.6),
            quote_value: Decimal::ZERO,
            notional: Decimal::ZERO,
            raw: Map::new(),
            ts_millis: 0,
        });
        // buy 0.5 more -> net 1.1 > 1.0 cap
        let err = risk
            .validate_order("SOL", 500, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RiskViolation(_)));
    }

    #[tokio::test]
    async fn notional_check_uses_far_side_top_of_book_when_price_missing() {
        let (_md, _pos, risk) = services(RiskLimits {
            max_position: None,
            max_notional: Some(dec!(1.0)),
        });
        // buy -> far side is ask = 10010/100 = 100.10; size 10/1000=0.01 -> notional ~1.0009
        let err = risk
            .validate_order("SOL", 10, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RiskViolation(_)));
    }

    #[tokio::test]
    async fn passes_when_within_all_limits() {
        let (_md, _pos, risk) = services(RiskLimits {
            max_position: Some(dec!(10.0)),
            max_notional: Some(dec!(1000.0)),
        });
        risk.validate_order("SOL", 1000, false, Some(10000))
            .await
            .unwrap();
    }
}
