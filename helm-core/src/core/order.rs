//! The unified order object: identity, state machine, event history, and
//! the awaitable completion contract strategies compose against.
//!
//! Grounded on `xbot/execution/models.py::Order` (the model actually used
//! by `order_service.py`, as opposed to the earlier `order_model.py`
//! draft): one mutable object behind a lock, a single-resolution "final
//! state" future, and one-shot "next update" waiters drained on every
//! applied event. The lock here is `parking_lot::Mutex` guarding plain
//! fields, plus a `tokio::sync::Notify` for the many-waiters completion
//! signal (rather than asyncio's single `Future`, which only one waiter
//! can usefully await without `asyncio.shield`).
//!
//! Deliberate deviation from the Python source: spec.md §3 requires that
//! "once terminal, further updates are ignored" — the original
//! `apply_update` keeps overwriting `state` even after a terminal event,
//! relying only on `_final_future.done()` to ignore later *completions*.
//! This implementation enforces the no-op at the state layer too, so a
//! racing post-terminal update cannot regress `state` or `history`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::{oneshot, Notify};

use super::types::{CanonicalSymbol, OrderState, VenueId};

/// A single immutable order event: the state it carries, when it was
/// observed, and a string-keyed info map for venue-specific detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderEvent {
    pub state: OrderState,
    pub ts_millis: i64,
    #[serde(default)]
    pub info: Map<String, Value>,
}

impl OrderEvent {
    pub fn new(state: OrderState, info: Map<String, Value>) -> Self {
        Self {
            state,
            ts_millis: now_millis(),
            info,
        }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Tries `filled_base_i`, then `filled_size_i`, then `filled`, tolerating
/// whichever key spelling a connector uses for cumulative fill amount
/// (spec.md §9 Open Questions). Returns `None` if none are present or
/// none parse as an integer.
pub fn extract_filled_i64(info: &Map<String, Value>) -> Option<i64> {
    for key in ["filled_base_i", "filled_size_i", "filled"] {
        if let Some(v) = info.get(key) {
            if let Some(i) = v.as_i64() {
                return Some(i);
            }
            if let Some(f) = v.as_f64() {
                return Some(f as i64);
            }
            if let Some(s) = v.as_str() {
                if let Ok(i) = s.parse::<i64>() {
                    return Some(i);
                }
                if let Ok(f) = s.parse::<f64>() {
                    return Some(f as i64);
                }
            }
        }
    }
    None
}

struct OrderMutState {
    state: OrderState,
    size_i: i64,
    price_i: Option<i64>,
    filled_base_i: i64,
    exchange_order_id: Option<String>,
    history: Vec<OrderEvent>,
    update_waiters: Vec<oneshot::Sender<OrderEvent>>,
}

struct OrderShared {
    venue: VenueId,
    canonical_symbol: CanonicalSymbol,
    coi: u32,
    is_ask: bool,
    trace_id: Option<String>,
    log_dir: Option<PathBuf>,
    mutstate: Mutex<OrderMutState>,
    completion: Notify,
}

/// A cheaply-cloneable handle to one order. Every clone refers to the same
/// underlying state; this is how the order registry, the submission path,
/// and the websocket ingestion path all observe one coherent order.
#[derive(Clone)]
pub struct Order(Arc<OrderShared>);

impl Order {
    /// Construct a new order in `Submitting` state. The caller (order
    /// service) is expected to immediately `apply_update` the initial
    /// `SUBMITTING` event so it lands in history.
    pub fn new(
        venue: VenueId,
        canonical_symbol: CanonicalSymbol,
        coi: u32,
        is_ask: bool,
        size_i: i64,
        price_i: Option<i64>,
        log_dir: Option<PathBuf>,
        trace_id: Option<String>,
    ) -> Self {
        Order(Arc::new(OrderShared {
            venue,
            canonical_symbol,
            coi,
            is_ask,
            trace_id,
            log_dir,
            mutstate: Mutex::new(OrderMutState {
                state: OrderState::Submitting,
                size_i,
                price_i,
                filled_base_i: 0,
                exchange_order_id: None,
                history: Vec::new(),
                update_waiters: Vec::new(),
            }),
            completion: Notify::new(),
        }))
    }

    pub fn venue(&self) -> &VenueId {
        &self.0.venue
    }

    pub fn canonical_symbol(&self) -> &CanonicalSymbol {
        &self.0.canonical_symbol
    }

    pub fn coi(&self) -> u32 {
        self.0.coi
    }

    pub fn is_ask(&self) -> bool {
        self.0.is_ask
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.0.trace_id.as_deref()
    }

    pub fn state(&self) -> OrderState {
        self.0.mutstate.lock().state
    }

    pub fn size_i(&self) -> i64 {
        self.0.mutstate.lock().size_i
    }

    pub fn price_i(&self) -> Option<i64> {
        self.0.mutstate.lock().price_i
    }

    pub fn filled_base_i(&self) -> i64 {
        self.0.mutstate.lock().filled_base_i
    }

    pub fn remaining_i(&self) -> i64 {
        let inner = self.0.mutstate.lock();
        (inner.size_i - inner.filled_base_i).max(0)
    }

    pub fn exchange_order_id(&self) -> Option<String> {
        self.0.mutstate.lock().exchange_order_id.clone()
    }

    pub fn history(&self) -> Vec<OrderEvent> {
        self.0.mutstate.lock().history.clone()
    }

    /// Most recent event, or a synthetic snapshot of the current state if
    /// nothing has been recorded yet.
    pub fn snapshot(&self) -> OrderEvent {
        let inner = self.0.mutstate.lock();
        inner
            .history
            .last()
            .cloned()
            .unwrap_or_else(|| OrderEvent::new(inner.state, Map::new()))
    }

    /// Apply an event to the order. A no-op if the order is already in a
    /// terminal state (spec.md §3, §5: "the first terminal transition
    /// wins"). `exchange_order_id`, when provided, is recorded regardless
    /// of whether this particular event carries a state change. Returns
    /// `false` when the update was dropped as a post-terminal no-op, so
    /// callers (metrics, reconciliation) can tell a real transition from
    /// a racing duplicate.
    pub fn apply_update(&self, event: OrderEvent, exchange_order_id: Option<String>) -> bool {
        let (waiters, is_terminal) = {
            let mut inner = self.0.mutstate.lock();
            if inner.state.is_terminal() {
                return false;
            }
            if let Some(id) = exchange_order_id {
                inner.exchange_order_id = Some(id);
            }
            if let Some(filled) = extract_filled_i64(&event.info) {
                inner.filled_base_i = filled.clamp(0, inner.size_i);
            }
            inner.state = event.state;
            inner.history.push(event.clone());

            let waiters: Vec<oneshot::Sender<OrderEvent>> =
                std::mem::take(&mut inner.update_waiters);
            let is_terminal = inner.state.is_terminal();

            // Durably written before waiters are released (spec.md §3).
            self.log_line(&inner, &event);
            (waiters, is_terminal)
        };
        for waiter in waiters {
            let _ = waiter.send(event.clone());
        }
        if is_terminal {
            self.0.completion.notify_waiters();
        }
        true
    }

    fn log_line(&self, inner: &OrderMutState, event: &OrderEvent) -> bool {
        let Some(dir) = &self.0.log_dir else {
            return true;
        };
        if std::fs::create_dir_all(dir).is_err() {
            return false;
        }
        let filename = format!(
            "{}-{}-{}.jsonl",
            self.0.venue, self.0.canonical_symbol, self.0.coi
        );
        let path = dir.join(filename);
        let mut payload = HashMap::new();
        payload.insert("trace_id", Value::from(self.0.trace_id.clone()));
        payload.insert("client_order_index", Value::from(self.0.coi));
        payload.insert(
            "exchange_order_id",
            Value::from(inner.exchange_order_id.clone()),
        );
        payload.insert("state", Value::from(event.state.to_string()));
        payload.insert("ts", Value::from(event.ts_millis));
        payload.insert("info", Value::Object(event.info.clone()));
        let Ok(line) = serde_json::to_string(&payload) else {
            return false;
        };
        use std::io::Write;
        match std::fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut f) => f.write_all(format!("{line}\n").as_bytes()).is_ok(),
            Err(_) => false,
        }
    }

    /// Waits for the order to reach a terminal state. Any number of
    /// callers may await this concurrently; all observe the same final
    /// state once it resolves. Returns `None` on timeout (caller decides
    /// what a timeout means; the order is left untouched).
    pub async fn wait_final(&self, timeout: Option<Duration>) -> Option<OrderState> {
        let wait = async {
            loop {
                let notified = self.0.completion.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                {
                    let inner = self.0.mutstate.lock();
                    if inner.state.is_terminal() {
                        return inner.state;
                    }
                }
                notified.await;
            }
        };
        match timeout {
            Some(d) => tokio::time::timeout(d, wait).await.ok(),
            None => Some(wait.await),
        }
    }

    /// Registers a one-shot waiter for the next non-terminal-or-terminal
    /// update and waits for it (or the timeout). Independent of
    /// `wait_final`: a caller might want to observe intermediate partial
    /// fills as they land.
    pub async fn next_update(&self, timeout: Option<Duration>) -> Option<OrderEvent> {
        let rx = {
            let mut inner = self.0.mutstate.lock();
            if inner.state.is_terminal() {
                return inner.history.last().cloned();
            }
            let (tx, rx) = oneshot::channel();
            inner.update_waiters.push(tx);
            rx
        };
        match timeout {
            Some(d) => tokio::time::timeout(d, rx).await.ok().and_then(|r| r.ok()),
            None => rx.await.ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        Order::new(
            VenueId::from("v1"),
            CanonicalSymbol::from("SOL"),
            7,
            false,
            1000,
            Some(10_000),
            None,
            None,
        )
    }

    #[tokio::test]
    async fn submitting_to_open_to_filled() {
        let o = order();
        o.apply_update(OrderEvent::new(OrderState::Submitting, Map::new()), None);
        assert_eq!(o.state(), OrderState::Submitting);
        o.apply_update(
            OrderEvent::new(OrderState::Open, Map::new()),
            Some("ex-1".into()),
        );
        assert_eq!(o.state(), OrderState::Open);
        assert_eq!(o.exchange_order_id().as_deref(), Some("ex-1"));

        let mut fill_info = Map::new();
        fill_info.insert("filled_base_i".into(), Value::from(1000));
        o.apply_update(OrderEvent::new(OrderState::Filled, fill_info), None);
        assert_eq!(o.state(), OrderState::Filled);
        assert_eq!(o.filled_base_i(), 1000);
        assert_eq!(o.remaining_i(), 0);
    }

    #[tokio::test]
    async fn post_terminal_updates_are_no_ops() {
        let o = order();
        assert!(o.apply_update(OrderEvent::new(OrderState::Cancelled, Map::new()), None));
        assert_eq!(o.state(), OrderState::Cancelled);
        assert!(!o.apply_update(OrderEvent::new(OrderState::Filled, Map::new()), None));
        assert_eq!(
            o.state(),
            OrderState::Cancelled,
            "first terminal transition wins"
        );
        assert_eq!(o.history().len(), 1);
    }

    #[tokio::test]
    async fn wait_final_resolves_for_all_concurrent_waiters() {
        let o = order();
        let o1 = o.clone();
        let o2 = o.clone();
        let h1 = tokio::spawn(async move { o1.wait_final(None).await });
        let h2 = tokio::spawn(async move { o2.wait_final(None).await });
        tokio::task::yield_now().await;
        o.apply_update(OrderEvent::new(OrderState::Filled, Map::new()), None);
        assert_eq!(h1.await.unwrap(), Some(OrderState::Filled));
        assert_eq!(h2.await.unwrap(), Some(OrderState::Filled));
    }

    #[tokio::test]
    async fn wait_final_times_out_while_order_stays_open() {
        let o = order();
        o.apply_update(OrderEvent::new(OrderState::Open, Map::new()), None);
        let res = o.wait_final(Some(Duration::from_millis(20))).await;
        assert_eq!(res, None);
        assert_eq!(o.state(), OrderState::Open);
    }

    #[tokio::test]
    async fn next_update_is_released_by_the_next_event_only() {
        let o = order();
        let waiter = o.clone();
        let handle = tokio::spawn(async move { waiter.next_update(None).await });
        tokio::task::yield_now().await;
        o.apply_update(OrderEvent::new(OrderState::Open, Map::new()), None);
        let event = handle.await.unwrap().expect("update delivered");
        assert_eq!(event.state, OrderState::Open);
    }

    #[test]
    fn extract_filled_tolerates_key_spellings() {
        let mut m = Map::new();
        m.insert("filled".into(), Value::from("42"));
        assert_eq!(extract_filled_i64(&m), Some(42));
    }
}
