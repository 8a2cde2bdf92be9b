//! Signed REST transport for [`super::ReferenceConnector`].
//!
//! Grounded on `xbot/connector/backpack.py`: market metadata (tick size,
//! step size, min quantity) is fetched once via a public `/markets` call
//! and cached per symbol (`_get_market_info`); `_format_int`/
//! `_decimal_places` become [`scale_decimals`]/[`format_scaled`] here.
//! Request signing follows `examples/ProfessorChill-crypto-com-api`'s
//! `ApiRequestBuilder` shape, adapted to this crate's
//! [`crate::signing::sign_request`] helper.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use helm_core::connector::{
    LimitOrderRequest, MarketOrderRequest, TopOfBookQuote, VenueOrderSnapshot, VenuePosition,
};
use helm_core::core::types::VenueSymbol;
use serde_json::{Map, Value};

use crate::credentials::Credentials;
use crate::error::ApiError;
use crate::signing::{canonical_param_string, epoch_millis, sign_request};

#[derive(Debug, Clone, Copy)]
struct MarketInfo {
    price_decimals: u32,
    size_decimals: u32,
    min_size_i: i64,
}

/// Signed REST client plus the per-symbol market-metadata cache every
/// connector method depends on.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    markets: DashMap<String, MarketInfo>,
    request_id: AtomicU64,
}

impl RestClient {
    pub fn new(base_url: String, credentials: Credentials) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            markets: DashMap::new(),
            request_id: AtomicU64::new(1),
        })
    }

    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::SeqCst)
    }

    fn require_auth(&self) -> Result<(&str, &str), ApiError> {
        let key = self
            .credentials
            .api_key()
            .ok_or(ApiError::MissingCredential("api_key"))?;
        let secret = self
            .credentials
            .api_secret()
            .ok_or(ApiError::MissingCredential("api_secret"))?;
        Ok((key, secret))
    }

    /// Fetches `/markets` once and populates the metadata cache for every
    /// symbol the engine was configured with. Symbols absent from the
    /// response are simply left uncached — later per-symbol lookups then
    /// raise `UnknownSymbol` the same as a cold cache would.
    pub async fn warm_market_cache(&self, symbols: &[VenueSymbol]) -> anyhow::Result<()> {
        let url = format!("{}/markets", self.base_url);
        let resp: Value = self.http.get(&url).send().await?.json().await?;
        let entries = resp
            .get("data")
            .and_then(Value::as_array)
            .or_else(|| resp.as_array())
            .cloned()
            .unwrap_or_default();

        let wanted: std::collections::HashSet<&str> =
            symbols.iter().map(|s| s.0.as_str()).collect();

        for entry in entries {
            let Some(symbol) = entry.get("symbol").and_then(Value::as_str) else {
                continue;
            };
            if !wanted.is_empty() && !wanted.contains(symbol) {
                continue;
            }
            let price_tick = entry
                .pointer("/filters/price/tickSize")
                .and_then(Value::as_str)
                .unwrap_or("1");
            let size_step = entry
                .pointer("/filters/quantity/stepSize")
                .and_then(Value::as_str)
                .unwrap_or("1");
            let min_qty = entry
                .pointer("/filters/quantity/minQuantity")
                .and_then(Value::as_str)
                .unwrap_or("0");
            let price_decimals = decimal_places(price_tick);
            let size_decimals = decimal_places(size_step);
            let min_size_i = to_scaled_i64(min_qty, size_decimals);
            self.markets.insert(
                symbol.to_string(),
                MarketInfo {
                    price_decimals,
                    size_decimals,
                    min_size_i,
                },
            );
        }
        Ok(())
    }

    fn market_info(&self, symbol: &VenueSymbol) -> anyhow::Result<MarketInfo> {
        self.markets
            .get(&symbol.0)
            .map(|v| *v)
            .ok_or_else(|| ApiError::UnknownSymbol(symbol.0.clone()).into())
    }

    pub async fn price_size_decimals(&self, symbol: &VenueSymbol) -> anyhow::Result<(u32, u32)> {
        let info = self.market_info(symbol)?;
        Ok((info.price_decimals, info.size_decimals))
    }

    pub async fn min_size_i(&self, symbol: &VenueSymbol) -> anyhow::Result<i64> {
        Ok(self.market_info(symbol)?.min_size_i)
    }

    pub async fn top_of_book(&self, symbol: &VenueSymbol) -> anyhow::Result<TopOfBookQuote> {
        let info = self.market_info(symbol)?;
        let scale = 10i64.pow(info.price_decimals);
        let url = format!("{}/depth", self.base_url);
        let resp: Value = self
            .http
            .get(&url)
            .query(&[("symbol", symbol.0.as_str())])
            .send()
            .await?
            .json()
            .await?;

        let best = |side: &str, pick_min: bool| -> Option<i64> {
            let levels = resp.get(side)?.as_array()?;
            levels
                .iter()
                .filter_map(|lvl| lvl.as_array()?.first()?.as_str())
                .filter_map(|p| p.parse::<f64>().ok())
                .fold(None, |acc: Option<f64>, price| match acc {
                    None => Some(price),
                    Some(cur) if pick_min == (price < cur) => Some(price),
                    Some(cur) => Some(cur),
                })
                .map(|p| (p * scale as f64).round() as i64)
        };

        Ok(TopOfBookQuote {
            bid_i: best("bids", false),
            ask_i: best("asks", true),
            scale,
        })
    }

    pub async fn submit_limit_order(&self, request: LimitOrderRequest) -> anyhow::Result<String> {
        let (_key, secret) = self.require_auth()?;
        let info = self.market_info(&request.venue_symbol)?;
        let mut body = Map::new();
        body.insert("symbol".into(), Value::from(request.venue_symbol.0.clone()));
        body.insert(
            "client_order_index".into(),
            Value::from(request.client_order_index),
        );
        body.insert("side".into(), Value::from(if request.is_ask { "ask" } else { "bid" }));
        body.insert("order_type".into(), Value::from("limit"));
        body.insert(
            "quantity".into(),
            Value::from(format_scaled(request.base_amount_i, info.size_decimals)),
        );
        body.insert(
            "price".into(),
            Value::from(format_scaled(request.price_i, info.price_decimals)),
        );
        body.insert("post_only".into(), Value::from(request.post_only));
        body.insert("reduce_only".into(), Value::from(request.reduce_only));
        self.post_signed("/orders", secret, body).await
    }

    pub async fn submit_market_order(&self, request: MarketOrderRequest) -> anyhow::Result<String> {
        let (_key, secret) = self.require_auth()?;
        let info = self.market_info(&request.venue_symbol)?;
        let mut body = Map::new();
        body.insert("symbol".into(), Value::from(request.venue_symbol.0.clone()));
        body.insert(
            "client_order_index".into(),
            Value::from(request.client_order_index),
        );
        body.insert("side".into(), Value::from(if request.is_ask { "ask" } else { "bid" }));
        body.insert("order_type".into(), Value::from("market"));
        body.insert(
            "quantity".into(),
            Value::from(format_scaled(request.size_i, info.size_decimals)),
        );
        body.insert("reduce_only".into(), Value::from(request.reduce_only));
        self.post_signed("/orders", secret, body).await
    }

    async fn post_signed(
        &self,
        path: &str,
        secret: &str,
        body: Map<String, Value>,
    ) -> anyhow::Result<String> {
        let (key, _) = self.require_auth()?;
        let id = self.next_id();
        let ts = epoch_millis();
        let params: Vec<(&str, String)> = body
            .iter()
            .map(|(k, v)| (k.as_str(), value_to_param(v)))
            .collect();
        let params_str = canonical_param_string(&params);
        let signature = sign_request(secret, path, &params_str, id, ts);

        let url = format!("{}{}", self.base_url, path);
        let resp: Value = self
            .http
            .post(&url)
            .header("X-Api-Key", key)
            .header("X-Signature", signature)
            .header("X-Timestamp", ts.to_string())
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(code) = resp.get("code").and_then(Value::as_i64) {
            let message = resp
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            anyhow::bail!(ApiError::Rejected { code, message });
        }
        resp.get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| resp.get("id").and_then(Value::as_i64).map(|i| i.to_string()))
            .ok_or_else(|| ApiError::MalformedResponse(resp.to_string()).into())
    }

    pub async fn cancel_by_client_id(
        &self,
        symbol: &VenueSymbol,
        client_order_index: u32,
    ) -> anyhow::Result<()> {
        let (key, secret) = self.require_auth()?;
        let mut body = Map::new();
        body.insert("symbol".into(), Value::from(symbol.0.clone()));
        body.insert("client_order_index".into(), Value::from(client_order_index));

        let id = self.next_id();
        let ts = epoch_millis();
        let params: Vec<(&str, String)> = body
            .iter()
            .map(|(k, v)| (k.as_str(), value_to_param(v)))
            .collect();
        let params_str = canonical_param_string(&params);
        let signature = sign_request(secret, "/orders/cancel", &params_str, id, ts);

        let url = format!("{}/orders/cancel", self.base_url);
        let resp: Value = self
            .http
            .post(&url)
            .header("X-Api-Key", key)
            .header("X-Signature", signature)
            .header("X-Timestamp", ts.to_string())
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        // Cancelling an already-terminal order is not an error (spec.md
        // §4.1); only a genuine rejection code surfaces.
        if let Some(code) = resp.get("code").and_then(Value::as_i64) {
            if code != 0 {
                let message = resp
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                anyhow::bail!(ApiError::Rejected { code, message });
            }
        }
        Ok(())
    }

    pub async fn get_order(
        &self,
        symbol: &VenueSymbol,
        client_order_index: u32,
    ) -> anyhow::Result<VenueOrderSnapshot> {
        let (key, secret) = self.require_auth()?;
        let id = self.next_id();
        let ts = epoch_millis();
        let params = [
            ("symbol", symbol.0.clone()),
            ("client_order_index", client_order_index.to_string()),
        ];
        let params_str = canonical_param_string(&params);
        let signature = sign_request(secret, "/orders", &params_str, id, ts);

        let url = format!("{}/orders", self.base_url);
        let resp: Value = self
            .http
            .get(&url)
            .header("X-Api-Key", key)
            .header("X-Signature", signature)
            .header("X-Timestamp", ts.to_string())
            .query(&params)
            .send()
            .await?
            .json()
            .await?;

        let state_raw = resp
            .get("status")
            .or_else(|| resp.get("state"))
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::MalformedResponse(resp.to_string()))?
            .to_string();
        let exchange_order_id = resp
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| resp.get("id").and_then(Value::as_i64).map(|i| i.to_string()));
        let info = resp.as_object().cloned().unwrap_or_default();
        Ok(VenueOrderSnapshot {
            state_raw,
            exchange_order_id,
            info,
        })
    }

    pub async fn get_positions(&self) -> anyhow::Result<Vec<VenuePosition>> {
        let Ok((key, secret)) = self.require_auth() else {
            return Ok(Vec::new());
        };
        let id = self.next_id();
        let ts = epoch_millis();
        let signature = sign_request(secret, "/positions", "", id, ts);
        let url = format!("{}/positions", self.base_url);
        let resp: Value = self
            .http
            .get(&url)
            .header("X-Api-Key", key)
            .header("X-Signature", signature)
            .header("X-Timestamp", ts.to_string())
            .send()
            .await?
            .json()
            .await?;
        let entries = resp
            .get("data")
            .and_then(Value::as_array)
            .or_else(|| resp.as_array())
            .cloned()
            .unwrap_or_default();

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let symbol = entry
                .get("symbol")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let base_qty = parse_decimal(entry.get("base_qty"));
            let quote_value = parse_decimal(entry.get("quote_value"));
            let notional = parse_decimal(entry.get("notional"));
            out.push(VenuePosition {
                venue_symbol: symbol,
                base_qty,
                quote_value,
                notional,
                raw: entry.as_object().cloned().unwrap_or_default(),
            });
        }
        Ok(out)
    }

    pub async fn get_margin(&self) -> anyhow::Result<Map<String, Value>> {
        let Ok((key, secret)) = self.require_auth() else {
            return Ok(Map::new());
        };
        let id = self.next_id();
        let ts = epoch_millis();
        let signature = sign_request(secret, "/margin", "", id, ts);
        let url = format!("{}/margin", self.base_url);
        let resp: Value = self
            .http
            .get(&url)
            .header("X-Api-Key", key)
            .header("X-Signature", signature)
            .header("X-Timestamp", ts.to_string())
            .send()
            .await?
            .json()
            .await?;
        Ok(resp.as_object().cloned().unwrap_or_default())
    }
}

fn value_to_param(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_decimal(v: Option<&Value>) -> rust_decimal::Decimal {
    v.and_then(Value::as_str)
        .and_then(|s| s.parse().ok())
        .unwrap_or(rust_decimal::Decimal::ZERO)
}

/// Number of fractional digits in a decimal string, trailing zeros
/// stripped — mirrors `_decimal_places` from `xbot/connector/backpack.py`.
fn decimal_places(value: &str) -> u32 {
    match value.split_once('.') {
        None => 0,
        Some((_, frac)) => frac.trim_end_matches('0').len() as u32,
    }
}

fn to_scaled_i64(value: &str, decimals: u32) -> i64 {
    let decimal: rust_decimal::Decimal = value.parse().unwrap_or_default();
    let scale = rust_decimal::Decimal::from(10i64.pow(decimals));
    (decimal * scale).trunc().to_string().parse().unwrap_or(0)
}

/// Formats a scaled integer back to the venue's decimal-string wire
/// format, the inverse of `to_scaled_i64` (`_format_int` in the source).
fn format_scaled(value_i: i64, decimals: u32) -> String {
    let scale = rust_decimal::Decimal::from(10i64.pow(decimals));
    (rust_decimal::Decimal::from(value_i) / scale).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_places_strips_trailing_zeros() {
        assert_eq!(decimal_places("0.010"), 2);
        assert_eq!(decimal_places("5"), 0);
        assert_eq!(decimal_places("1.000"), 0);
    }

    #[test]
    fn format_scaled_round_trips_to_scaled_i64() {
        let formatted = format_scaled(10025, 2);
        assert_eq!(formatted, "100.25");
        assert_eq!(to_scaled_i64(&formatted, 2), 10025);
    }
}
