//! Connector-scoped startup/shutdown coordination: start the connector,
//! spawn its background tasks (typically one websocket consumer per
//! venue), and tear both down idempotently.
//!
//! Grounded on `xbot/core/lifecycle.py::LifecycleController`. Python's
//! `asyncio.Task.cancel()` + swallow-`CancelledError` becomes
//! `JoinHandle::abort()` + swallow the resulting cancelled `JoinError`
//! (spec.md §5: "errors during shutdown are logged and swallowed so that
//! multiple resources still get cleaned up").

use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::connector::Connector;

/// A background task factory: called once per `start()` to produce the
/// future that becomes a spawned task. Boxed because each venue's
/// websocket consumer closure captures different state.
pub type TaskFactory =
    Box<dyn Fn() -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> + Send + Sync>;

struct State {
    started: bool,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns one connector and its background tasks for the process's
/// lifetime. `start`/`stop` are idempotent and safe to call from a
/// ctrl-c handler racing the main loop.
pub struct LifecycleController {
    connector: Arc<dyn Connector>,
    factories: Vec<TaskFactory>,
    state: Mutex<State>,
}

impl LifecycleController {
    pub fn new(connector: Arc<dyn Connector>, factories: Vec<TaskFactory>) -> Self {
        Self {
            connector,
            factories,
            state: Mutex::new(State {
                started: false,
                tasks: Vec::new(),
            }),
        }
    }

    pub async fn start(&self) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if state.started {
            return Ok(());
        }
        self.connector.start().await?;
        for factory in &self.factories {
            let fut = factory();
            state.tasks.push(tokio::spawn(fut));
        }
        state.started = true;
        Ok(())
    }

    /// Cancels every background task, awaits them, stops the connector.
    /// Never returns an error itself: task-join and connector-stop
    /// failures are logged, not propagated, so every resource still gets
    /// a chance to close (spec.md §5, §7).
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        if !state.started {
            return;
        }
        for task in &state.tasks {
            task.abort();
        }
        for task in state.tasks.drain(..) {
            match task.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => warn!(error = %err, "background task panicked during shutdown"),
            }
        }
        if let Err(err) = self.connector.stop().await {
            error!(error = %err, "connector stop failed during shutdown");
        }
        state.started = false;
    }

    pub fn connector(&self) -> &Arc<dyn Connector> {
        &self.connector
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{
        LimitOrderRequest, MarketOrderRequest, TopOfBookQuote, VenueOrderSnapshot, VenuePosition,
    };
    use crate::core::types::{VenueId, VenueSymbol};
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FlagConnector {
        venue: VenueId,
        started: Arc<AtomicBool>,
        stopped: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connector for FlagConnector {
        fn venue(&self) -> &VenueId {
            &self.venue
        }
        async fn start(&self) -> anyhow::Result<()> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }
        async fn stop(&self) -> anyhow::Result<()> {
            self.stopped.store(true, Ordering::SeqCst);
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
            Ok(vec![])
        }
        async fn get_margin(&self) -> anyhow::Result<Map<String, Value>> {
            Ok(Map::new())
        }
    }

    #[tokio::test]
    async fn start_then_stop_is_idempotent_and_flips_flags() {
        let started = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let connector = Arc::new(FlagConnector {
            venue: VenueId::from("v1"),
            started: started.clone(),
            stopped: stopped.clone(),
        });
        let spawn_count = Arc::new(AtomicU32::new(0));
        let counter = spawn_count.clone();
        let factory: TaskFactory = Box::new(move || {
            let counter = counter.clone();
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            })
        });

        let controller = LifecycleController::new(connector, vec![factory]);
        controller.start().await.unwrap();
        controller.start().await.unwrap(); // idempotent, no double-spawn
        assert!(started.load(Ordering::SeqCst));

        tokio::task::yield_now().await;
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);

        controller.stop().await;
        controller.stop().await; // idempotent
        assert!(stopped.load(Ordering::SeqCst));
    }
}
