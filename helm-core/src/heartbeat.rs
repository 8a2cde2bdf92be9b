//! Periodic "I'm alive" POST carrying current positions and margin to an
//! external monitoring endpoint.
//!
//! Grounded on `xbot/core/heartbeat.py::HeartbeatService`: fire on an
//! interval, tolerate connector and HTTP failures without ever stopping
//! the loop (spec.md §4.10 — heartbeat failures must never interrupt
//! trading). `reqwest::Client` replaces `httpx.AsyncClient`; the
//! start/stop idempotence and cancel-then-join shutdown mirror
//! `LifecycleController`'s pattern directly.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::connector::Connector;

/// Heartbeat endpoint configuration.
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
    pub bearer_token: Option<String>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(5),
            bearer_token: None,
        }
    }
}

#[derive(Serialize)]
struct HeartbeatPayload {
    ts: i64,
    strategy: String,
    venue: String,
    positions: Vec<Map<String, Value>>,
    margin: Map<String, Value>,
}

struct State {
    task: Option<JoinHandle<()>>,
}

/// Posts a heartbeat payload on `config.interval` until stopped. One
/// instance per venue connector.
pub struct HeartbeatService {
    connector: Arc<dyn Connector>,
    client: reqwest::Client,
    strategy_name: String,
    venue: String,
    config: HeartbeatConfig,
    state: Mutex<State>,
}

impl HeartbeatService {
    pub fn new(
        connector: Arc<dyn Connector>,
        strategy_name: String,
        venue: String,
        config: HeartbeatConfig,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            connector,
            client,
            strategy_name,
            venue,
            config,
            state: Mutex::new(State { task: None }),
        })
    }

    pub async fn start(self: &Arc<Self>) {
        let mut state = self.state.lock().await;
        if state.task.is_some() {
            return;
        }
        let this = self.clone();
        state.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.interval);
            loop {
                ticker.tick().await;
                this.emit_once().await;
            }
        }));
    }

    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if let Some(task) = state.task.take() {
            task.abort();
            if let Err(err) = task.await {
                if !err.is_cancelled() {
                    warn!(error = %err, "heartbeat task panicked during shutdown");
                }
            }
        }
    }

    async fn emit_once(&self) {
        let positions = match self.connector.get_positions().await {
            Ok(positions) => positions
                .into_iter()
                .map(|p| {
                    let mut m = p.raw;
                    m.insert("venue_symbol".into(), Value::from(p.venue_symbol));
                    m.insert("base_qty".into(), Value::from(p.base_qty.to_string()));
                    m
                })
                .collect(),
            Err(err) => {
                warn!(error = %err, "heartbeat: get_positions failed, sending empty list");
                Vec::new()
            }
        };
        let margin = self.connector.get_margin().await.unwrap_or_else(|err| {
            warn!(error = %err, "heartbeat: get_margin failed, sending empty map");
            Map::new()
        });
        let payload = HeartbeatPayload {
            ts: now_millis(),
            strategy: self.strategy_name.clone(),
            venue: self.venue.clone(),
            positions,
            margin,
        };

        let mut request = self.client.post(&self.config.url).json(&payload);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }
        if let Err(err) = request.send().await {
            warn!(error = %err, url = %self.config.url, "heartbeat POST failed");
        }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        LimitOrderRequest, MarketOrderRequest, TopOfBookQuote, VenueOrderSnapshot, VenuePosition,
    };
    use crate::core::types::{VenueId, VenueSymbol};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingConnector {
        venue: VenueId,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Connector for FailingConnector {
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
            Ok(TopOfBookQuote::default())
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            anyhow::bail!("connector unreachable")
        }
        async fn get_margin(&self) -> anyhow::Result<Map<String, Value>> {
            anyhow::bail!("connector unreachable")
        }
    }

    #[tokio::test]
    async fn emit_once_tolerates_connector_failures() {
        let connector = Arc::new(FailingConnector {
            venue: VenueId::from("v1"),
            calls: AtomicU32::new(0),
        });
        let service = HeartbeatService::new(
            connector.clone(),
            "test-strategy".to_string(),
            "v1".to_string(),
            HeartbeatConfig {
                url: "http://127.0.0.1:1/unreachable".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        service.emit_once().await;
        assert_eq!(connector.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_stop_is_idempotent() {
        let connector = Arc::new(FailingConnector {
            venue: VenueId::from("v1"),
            calls: AtomicU32::new(0),
        });
        let service = Arc::new(
            HeartbeatService::new(
                connector,
                "test-strategy".to_string(),
                "v1".to_string(),
                HeartbeatConfig {
                    url: "http://127.0.0.1:1/unreachable".to_string(),
                    interval: Duration::from_millis(10),
                    ..Default::default()
                },
            )
            .unwrap(),
        );
        service.start().await;
        service.start().await;
        service.stop().await;
        service.stop().await;
    }
}
