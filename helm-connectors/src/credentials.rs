//! Credential file parsing: simple `key: value` lines, one file per venue.
//!
//! Grounded on `xbot/connector/backpack.py::BackpackConnector._load_keys`
//! and `xbot/connector/backpack_ws.py::BackpackWsClient._load_keys`: split
//! each non-empty line on the first `:`, trim both sides, tolerate a few
//! spellings of the same field (`api key`, `api_key`, `apiKey`). spec.md §6
//! leaves the exact field set venue-specific, so this parser exposes the
//! raw map plus named accessors for the fields the reference connector
//! actually uses.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};

/// Parsed `key: value` lines from a venue credential file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    fields: HashMap<String, String>,
}

impl Credentials {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading credential file {}", path.display()))?;
        Ok(Self::parse(&raw))
    }

    pub fn parse(raw: &str) -> Self {
        let mut fields = HashMap::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                fields.insert(normalize_key(key), value.trim().to_string());
            }
        }
        Self { fields }
    }

    fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .find_map(|k| self.fields.get(&normalize_key(k)))
            .map(|s| s.as_str())
    }

    pub fn api_key(&self) -> Option<&str> {
        self.get_any(&["api_key", "api key", "apiKey", "key"])
    }

    pub fn api_secret(&self) -> Option<&str> {
        self.get_any(&["api_secret", "api secret", "apiSecret", "secret"])
    }

    pub fn account_index(&self) -> Option<&str> {
        self.get_any(&["account_index", "account index", "accountIndex"])
    }

    pub fn eth_address(&self) -> Option<&str> {
        self.get_any(&["eth_address", "eth address", "ethAddress"])
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(&normalize_key(key)).map(|s| s.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.api_key().is_some() && self.api_secret().is_some()
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_ascii_lowercase().replace([' ', '-'], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_canonical_key_value_lines() {
        let creds = Credentials::parse("api_key: abc123\napi_secret: shh\n");
        assert_eq!(creds.api_key(), Some("abc123"));
        assert_eq!(creds.api_secret(), Some("shh"));
        assert!(creds.is_authenticated());
    }

    #[test]
    fn tolerates_alternate_spellings_and_spacing() {
        let creds = Credentials::parse("api key : abc123 \n apiSecret:shh\n");
        assert_eq!(creds.api_key(), Some("abc123"));
        assert_eq!(creds.api_secret(), Some("shh"));
    }

    #[test]
    fn ignores_blank_lines_and_comments() {
        let creds = Credentials::parse("# comment\n\napi_key: abc123\n");
        assert_eq!(creds.api_key(), Some("abc123"));
    }

    #[test]
    fn missing_file_is_unauthenticated() {
        let creds = Credentials::default();
        assert!(!creds.is_authenticated());
        assert_eq!(creds.api_key(), None);
    }

    #[test]
    fn reads_account_index_and_eth_address_when_present() {
        let creds = Credentials::parse("account_index: 7\neth_address: 0xabc\n");
        assert_eq!(creds.account_index(), Some("7"));
        assert_eq!(creds.eth_address(), Some("0xabc"));
    }
}
