//! Command-line surface: a config file path plus the handful of flag
//! overrides spec.md §6 treats as invocation-time (CLI beats TOML file,
//! TOML file beats struct default).

use std::path::PathBuf;

use clap::Parser;

use helm_core::config::{AppConfig, ConfigSide, Mode as ConfigMode};

#[derive(Debug, Parser)]
#[command(name = "helm", about = "Multi-venue crypto trading execution engine")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(long)]
    pub config: PathBuf,

    #[arg(long)]
    pub venue: Option<String>,

    #[arg(long)]
    pub symbol: Option<String>,

    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<ConfigMode>,

    #[arg(long)]
    pub qty: Option<rust_decimal::Decimal>,

    #[arg(long, value_parser = parse_side)]
    pub side: Option<ConfigSide>,

    #[arg(long)]
    pub reduce_only: bool,

    #[arg(long)]
    pub log_level: Option<String>,
}

impl Args {
    /// Applies every flag the caller actually set onto a loaded config.
    /// Unset flags leave the TOML-file (or struct-default) value in place.
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(venue) = &self.venue {
            config.venue = venue.clone();
        }
        if let Some(symbol) = &self.symbol {
            config.symbol = symbol.clone();
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(qty) = self.qty {
            config.qty = qty;
        }
        if let Some(side) = self.side {
            config.side = side;
        }
        if self.reduce_only {
            config.reduce_only = true;
        }
        if let Some(log_level) = &self.log_level {
            config.log_level = log_level.clone();
        }
    }
}

fn parse_mode(raw: &str) -> Result<ConfigMode, String> {
    match raw.to_ascii_lowercase().replace('-', "_").as_str() {
        "market" => Ok(ConfigMode::Market),
        "tracking_limit" => Ok(ConfigMode::TrackingLimit),
        "diagnostic" => Ok(ConfigMode::Diagnostic),
        other => Err(format!(
            "unknown mode {other:?}, expected market, tracking_limit, or diagnostic"
        )),
    }
}

fn parse_side(raw: &str) -> Result<ConfigSide, String> {
    match raw.to_ascii_lowercase().as_str() {
        "buy" => Ok(ConfigSide::Buy),
        "sell" => Ok(ConfigSide::Sell),
        other => Err(format!("unknown side {other:?}, expected buy or sell")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn base_config() -> AppConfig {
        let mut symbol_map = HashMap::new();
        symbol_map.insert("SOL".to_string(), "SOL_USDC_PERP".to_string());
        AppConfig {
            venue: "crypto_com".to_string(),
            rest_base_url: "https://example.invalid".to_string(),
            ws_url: "wss://example.invalid".to_string(),
            credentials_path: None,
            symbol: "SOL".to_string(),
            mode: ConfigMode::Market,
            qty: dec!(1.0),
            side: ConfigSide::Buy,
            price_offset_ticks: 0,
            interval_secs: 10.0,
            timeout_secs: 120.0,
            reduce_only: false,
            symbol_map,
            risk: Default::default(),
            heartbeat: None,
            log_level: "info".to_string(),
            json_logs: true,
            log_dir: None,
        }
    }

    #[test]
    fn unset_flags_leave_config_untouched() {
        let args = Args {
            config: PathBuf::from("irrelevant.toml"),
            venue: None,
            symbol: None,
            mode: None,
            qty: None,
            side: None,
            reduce_only: false,
            log_level: None,
        };
        let mut config = base_config();
        args.apply_overrides(&mut config);
        assert_eq!(config.symbol, "SOL");
        assert_eq!(config.side, ConfigSide::Buy);
    }

    #[test]
    fn set_flags_override_config_values() {
        let args = Args {
            config: PathBuf::from("irrelevant.toml"),
            venue: Some("other_venue".to_string()),
            symbol: Some("BTC".to_string()),
            mode: Some(ConfigMode::TrackingLimit),
            qty: Some(dec!(2.5)),
            side: Some(ConfigSide::Sell),
            reduce_only: true,
            log_level: Some("debug".to_string()),
        };
        let mut config = base_config();
        args.apply_overrides(&mut config);
        assert_eq!(config.venue, "other_venue");
        assert_eq!(config.symbol, "BTC");
        assert_eq!(config.mode, ConfigMode::TrackingLimit);
        assert_eq!(config.qty, dec!(2.5));
        assert_eq!(config.side, ConfigSide::Sell);
        assert!(config.reduce_only);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn parse_mode_accepts_hyphen_or_underscore() {
        assert_eq!(parse_mode("tracking-limit"), Ok(ConfigMode::TrackingLimit));
        assert_eq!(parse_mode("tracking_limit"), Ok(ConfigMode::TrackingLimit));
        assert!(parse_mode("bogus").is_err());
    }

    #[test]
    fn parse_side_rejects_unknown_values() {
        assert_eq!(parse_side("BUY"), Ok(ConfigSide::Buy));
        assert!(parse_side("long").is_err());
    }
}
