//! Domain-specific error types for the execution core.
//!
//! These map directly onto spec §7's error kinds: unknown symbols/orders,
//! risk rejections, tracking-limit exhaustion, and venue-surfaced failures.
//! Connector-specific detail is preserved via `anyhow::Error` since venues
//! differ in what they can usefully report.

use thiserror::Error;

/// Errors raised by the execution core.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A canonical symbol has no entry in the active venue's symbol map.
    #[error("unknown canonical symbol: {0}")]
    UnknownSymbol(String),

    /// A client order index has no entry in the order registry.
    #[error("unknown order: coi={0}")]
    UnknownOrder(u32),

    /// A pre-trade risk check rejected the order.
    #[error("risk violation: {0}")]
    RiskViolation(String),

    /// The tracking-limit engine exhausted its deadline or attempt budget
    /// without reaching a full fill.
    #[error("tracking limit timeout: {0}")]
    TrackingLimitTimeout(String),

    /// The connector rejected or failed a request (submission, cancel,
    /// query). The wrapped error carries whatever detail the venue gave.
    #[error("connector error: {0}")]
    Connector(#[from] anyhow::Error),
}
