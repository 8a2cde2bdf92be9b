//! Reconnecting websocket order-update stream for [`super::ReferenceConnector`].
//!
//! Grounded on `xbot/connector/backpack_ws.py::BackpackWsClient._run`: one
//! long-lived task, subscribe to public depth/trade streams plus (when
//! keys are present) a private order-update stream, reconnect on any
//! transport error with backoff, never propagate the error — a flaky
//! websocket degrades to "updates arrive late" rather than crashing the
//! connector. Reconnect backoff is `helm_connectors::backoff`'s
//! `ExponentialBackoff`.

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use helm_core::connector::{map_order_state_str, VenueOrderUpdate};

use crate::backoff::ExponentialBackoff;
use crate::credentials::Credentials;
use crate::signing::{epoch_millis, sign_request};

pub struct WsWorker {
    url: String,
    symbols: Vec<String>,
    private_credentials: Option<Credentials>,
    update_tx: UnboundedSender<VenueOrderUpdate>,
}

impl WsWorker {
    pub fn new(
        url: String,
        symbols: Vec<String>,
        private_credentials: Option<Credentials>,
        update_tx: UnboundedSender<VenueOrderUpdate>,
    ) -> Self {
        Self {
            url,
            symbols,
            private_credentials,
            update_tx,
        }
    }

    pub async fn run(self) {
        let mut backoff = ExponentialBackoff::new();
        loop {
            match self.connect_and_consume().await {
                Ok(()) => {
                    // Graceful server-initiated close: reset backoff and
                    // reconnect promptly rather than treating it as flaky.
                    backoff.reset();
                }
                Err(err) => {
                    warn!(error = %err, url = %self.url, "websocket stream error, reconnecting");
                }
            }
            let Some(delay) = backoff.next_delay() else {
                warn!("websocket reconnect attempts exhausted, giving up");
                return;
            };
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_consume(&self) -> anyhow::Result<()> {
        let (mut stream, _) = tokio_tungstenite::connect_async(&self.url).await?;
        info!(url = %self.url, "websocket connected");

        let public_streams: Vec<String> = self
            .symbols
            .iter()
            .flat_map(|s| [format!("depth.{s}"), format!("trade.{s}")])
            .collect();
        self.subscribe(&mut stream, &public_streams, None).await?;

        if let Some(creds) = &self.private_credentials {
            if let Some(signature) = signature_tuple(creds) {
                self.subscribe(
                    &mut stream,
                    &["account.orderUpdate".to_string()],
                    Some(signature),
                )
                .await?;
            }
        }

        while let Some(msg) = stream.next().await {
            let msg = msg?;
            match msg {
                Message::Text(text) => self.handle_message(&text),
                Message::Ping(payload) => {
                    let _ = stream.send(Message::Pong(payload)).await;
                }
                Message::Close(_) => return Ok(()),
                _ => {}
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        stream: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        streams: &[String],
        signature: Option<Vec<String>>,
    ) -> anyhow::Result<()> {
        if streams.is_empty() {
            return Ok(());
        }
        let mut payload = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": streams,
        });
        if let Some(sig) = signature {
            payload["signature"] = Value::from(sig);
        }
        stream.send(Message::Text(payload.to_string())).await?;
        Ok(())
    }

    fn handle_message(&self, text: &str) {
        let Ok(msg) = serde_json::from_str::<Value>(text) else {
            debug!(raw = %text, "dropping unparseable websocket frame");
            return;
        };
        let Some(stream_name) = msg.get("stream").and_then(Value::as_str) else {
            return;
        };
        let Some(data) = msg.get("data") else {
            return;
        };

        if stream_name == "account.orderUpdate" {
            self.handle_order_update(data);
        }
        // depth./trade. streams would feed a MarketCache here in a fuller
        // wiring; the lifecycle controller owns that plumbing (spec.md
        // §4.9), this worker only forwards what the order service needs.
    }

    fn handle_order_update(&self, data: &Value) {
        let Some(coi) = data
            .get("client_order_index")
            .or_else(|| data.get("clientOrderId"))
            .and_then(Value::as_u64)
        else {
            debug!(?data, "order update missing client_order_index");
            return;
        };
        let Some(state_raw) = data
            .get("status")
            .or_else(|| data.get("state"))
            .and_then(Value::as_str)
        else {
            debug!(?data, "order update missing status");
            return;
        };
        let Some(state) = map_order_state_str(state_raw) else {
            debug!(state_raw, "order update carries unrecognized venue status");
            return;
        };
        let exchange_order_id = data
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| data.get("id").and_then(Value::as_i64).map(|i| i.to_string()));
        let info = data.as_object().cloned().unwrap_or_default();

        let _ = self.update_tx.send(VenueOrderUpdate {
            client_order_index: coi as u32,
            state,
            exchange_order_id,
            info,
        });
    }
}

/// Signs a `subscribe` instruction the same way
/// `BackpackWsClient._signature_tuple` does, substituting HMAC (this
/// crate's `signing` module) for the Python source's ed25519 scheme since
/// the reference venue's account model is HMAC-keyed like its REST side.
fn signature_tuple(creds: &Credentials) -> Option<Vec<String>> {
    let key = creds.api_key()?;
    let secret = creds.api_secret()?;
    let ts = epoch_millis();
    let window: u64 = 5000;
    let message = format!("instruction=subscribe&timestamp={ts}&window={window}");
    let signature = sign_request(secret, "subscribe", &message, 0, ts);
    Some(vec![
        key.to_string(),
        signature,
        ts.to_string(),
        window.to_string(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use helm_core::core::types::OrderState;

    fn worker() -> (WsWorker, tokio::sync::mpsc::UnboundedReceiver<VenueOrderUpdate>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (
            WsWorker::new("wss://example.invalid".to_string(), vec!["SOL".to_string()], None, tx),
            rx,
        )
    }

    #[test]
    fn signature_tuple_is_none_without_credentials() {
        assert!(signature_tuple(&Credentials::default()).is_none());
    }

    #[test]
    fn signature_tuple_present_once_keys_are_set() {
        let creds = Credentials::parse("api_key: k\napi_secret: s\n");
        let sig = signature_tuple(&creds).expect("keys present");
        assert_eq!(sig[0], "k");
        assert_eq!(sig.len(), 4);
    }

    #[tokio::test]
    async fn order_update_forwards_mapped_state() {
        let (worker, mut rx) = worker();
        let data = serde_json::json!({
            "client_order_index": 42,
            "status": "Filled",
            "id": "ex-9",
        });
        worker.handle_order_update(&data);
        let update = rx.try_recv().expect("update forwarded");
        assert_eq!(update.client_order_index, 42);
        assert_eq!(update.state, OrderState::Filled);
        assert_eq!(update.exchange_order_id.as_deref(), Some("ex-9"));
    }

    #[tokio::test]
    async fn order_update_with_unknown_status_is_dropped() {
        let (worker, mut rx) = worker();
        let data = serde_json::json!({"client_order_index": 1, "status": "unheard-of"});
        worker.handle_order_update(&data);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn non_order_update_stream_is_ignored() {
        let (worker, mut rx) = worker();
        worker.handle_message(r#"{"stream":"depth.SOL","data":{"b":[["100","1"]]}}"#);
        assert!(rx.try_recv().is_err());
    }
}
