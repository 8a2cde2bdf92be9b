//! `helm-connectors` — the one concrete [`helm_core::connector::Connector`]
//! implementation this workspace ships, plus the plumbing every venue
//! connector needs regardless of its wire protocol: credential parsing and
//! a jittered reconnect backoff.
//!
//! Grounded on `examples/ProfessorChill-crypto-com-api` for the signed
//! REST request/response shape and on `xbot/connector/backpack.py` /
//! `xbot/connector/backpack_ws.py` for the symbol-metadata, order-status,
//! and websocket-reconnect responsibilities spec.md §4.1/§1 push onto a
//! connector rather than the engine core.

pub mod backoff;
pub mod credentials;
pub mod error;
pub mod reference;
pub mod signing;

pub use backoff::{BackoffConfig, ExponentialBackoff};
pub use credentials::Credentials;
pub use error::ApiError;
pub use reference::{config_from_symbol_map, ReferenceConnector, ReferenceConnectorConfig};
