//! The field-level shape of `AppConfig`, as deserialized from TOML and
//! overridden by `helm-cli` flags per spec.md §6.

use std::collections::HashMap;
use std::path::PathBuf;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Run mode: which execution path `helm-cli` drives the router through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Market,
    TrackingLimit,
    Diagnostic,
}

/// Order side as spelled in config/CLI flags (distinct from
/// `core::types::Side` so config parsing doesn't leak into the engine's
/// own vocabulary, even though the two enums are presently identical).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl From<Side> for crate::core::types::Side {
    fn from(s: Side) -> Self {
        match s {
            Side::Buy => crate::core::types::Side::Buy,
            Side::Sell => crate::core::types::Side::Sell,
        }
    }
}

/// Optional pre-trade limits, mirrored 1:1 onto `risk::RiskLimits` at
/// startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskSettings {
    #[serde(default)]
    pub max_position: Option<Decimal>,
    #[serde(default)]
    pub max_notional: Option<Decimal>,
}

/// Heartbeat POST settings; absent entirely when heartbeating is
/// disabled (spec.md §6: `heartbeat.url` is optional).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatSettings {
    pub url: String,
    #[serde(default = "default_heartbeat_interval")]
    pub interval_secs: f64,
    #[serde(default = "default_heartbeat_timeout")]
    pub timeout_secs: f64,
    #[serde(default)]
    pub bearer_token: Option<String>,
}

fn default_heartbeat_interval() -> f64 {
    30.0
}

fn default_heartbeat_timeout() -> f64 {
    5.0
}

/// Invocation-time configuration for one run of `helm-cli`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub venue: String,
    pub rest_base_url: String,
    pub ws_url: String,
    #[serde(default)]
    pub credentials_path: Option<PathBuf>,
    pub symbol: String,
    pub mode: Mode,
    pub qty: Decimal,
    pub side: Side,
    #[serde(default)]
    pub price_offset_ticks: i64,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: f64,
    #[serde(default)]
    pub reduce_only: bool,
    pub symbol_map: HashMap<String, String>,
    #[serde(default)]
    pub risk: RiskSettings,
    #[serde(default)]
    pub heartbeat: Option<HeartbeatSettings>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_interval_secs() -> f64 {
    10.0
}

fn default_timeout_secs() -> f64 {
    120.0
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json_logs() -> bool {
    true
}
