//! Invocation-time configuration: the TOML-loadable `AppConfig` that
//! `helm-cli` parses and overrides with flags before wiring up the
//! execution core.
//!
//! Grounded on spec.md §6's enumerated configuration surface. Loading
//! follows the teacher's precedence idea (built-in default → TOML file →
//! explicit overrides) but is runtime-only: this crate has no
//! compile-time-feature risk-limit system, since venue/symbol/limits are
//! all invocation-time choices here, not constants baked into a binary.

pub mod types;

pub use types::{
    AppConfig, HeartbeatSettings, Mode, RiskSettings, Side as ConfigSide,
};

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

impl AppConfig {
    /// Loads a TOML file at `path` and validates it. Callers apply
    /// CLI-flag overrides to the returned value afterward (`helm-cli`
    /// owns precedence: CLI flag > TOML file > struct default).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field invariants not expressible in the type
    /// system: positive durations, a non-empty symbol map, risk limits
    /// that are themselves positive when present.
    pub fn validate(&self) -> Result<()> {
        if self.venue.trim().is_empty() {
            anyhow::bail!("venue must not be empty");
        }
        if self.rest_base_url.trim().is_empty() {
            anyhow::bail!("rest_base_url must not be empty");
        }
        if self.ws_url.trim().is_empty() {
            anyhow::bail!("ws_url must not be empty");
        }
        if self.symbol.trim().is_empty() {
            anyhow::bail!("symbol must not be empty");
        }
        if self.qty <= rust_decimal::Decimal::ZERO {
            anyhow::bail!("qty must be positive");
        }
        if self.interval_secs <= 0.0 {
            anyhow::bail!("interval_secs must be positive");
        }
        if self.timeout_secs <= 0.0 {
            anyhow::bail!("timeout_secs must be positive");
        }
        if self.symbol_map.is_empty() {
            anyhow::bail!("symbol_map must contain at least one canonical->venue mapping");
        }
        if !self.symbol_map.contains_key(&self.symbol.to_ascii_uppercase()) {
            anyhow::bail!(
                "symbol_map has no entry for configured symbol {}",
                self.symbol
            );
        }
        if let Some(max_position) = self.risk.max_position {
            if max_position <= rust_decimal::Decimal::ZERO {
                anyhow::bail!("risk.max_position must be positive when set");
            }
        }
        if let Some(max_notional) = self.risk.max_notional {
            if max_notional <= rust_decimal::Decimal::ZERO {
                anyhow::bail!("risk.max_notional must be positive when set");
            }
        }
        if let Some(heartbeat) = &self.heartbeat {
            if heartbeat.url.trim().is_empty() {
                anyhow::bail!("heartbeat.url must not be empty when heartbeat is configured");
            }
            if heartbeat.interval_secs <= 0.0 {
                anyhow::bail!("heartbeat.interval_secs must be positive");
            }
            if heartbeat.timeout_secs <= 0.0 {
                anyhow::bail!("heartbeat.timeout_secs must be positive");
            }
        }
        Ok(())
    }

    pub fn symbol_map_strings(&self) -> HashMap<String, String> {
        self.symbol_map.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> AppConfig {
        let mut symbol_map = HashMap::new();
        symbol_map.insert("SOL".to_string(), "SOL_USDC_PERP".to_string());
        AppConfig {
            venue: "crypto_com".to_string(),
            rest_base_url: "https://example.invalid".to_string(),
            ws_url: "wss://example.invalid".to_string(),
            credentials_path: None,
            symbol: "SOL".to_string(),
            mode: Mode::Market,
            qty: dec!(1.0),
            side: ConfigSide::Buy,
            price_offset_ticks: 0,
            interval_secs: 10.0,
            timeout_secs: 120.0,
            reduce_only: false,
            symbol_map,
            risk: RiskSettings::default(),
            heartbeat: None,
            log_level: "info".to_string(),
            json_logs: true,
            log_dir: None,
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn empty_rest_base_url_is_rejected() {
        let mut cfg = base_config();
        cfg.rest_base_url.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_symbol_map_is_rejected() {
        let mut cfg = base_config();
        cfg.symbol_map.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn symbol_not_in_map_is_rejected() {
        let mut cfg = base_config();
        cfg.symbol = "BTC".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn non_positive_qty_is_rejected() {
        let mut cfg = base_config();
        cfg.qty = rust_decimal::Decimal::ZERO;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn negative_risk_limit_is_rejected() {
        let mut cfg = base_config();
        cfg.risk.max_position = Some(dec!(-1.0));
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn heartbeat_without_url_is_rejected() {
        let mut cfg = base_config();
        cfg.heartbeat = Some(HeartbeatSettings {
            url: String::new(),
            interval_secs: 30.0,
            timeout_secs: 5.0,
            bearer_token: None,
        });
        assert!(cfg.validate().is_err());
    }
}
