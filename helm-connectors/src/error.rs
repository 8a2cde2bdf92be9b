//! Error surface for the reference connector's REST/WS transports.
//!
//! Grounded on `examples/ProfessorChill-crypto-com-api/src/error.rs`'s
//! `thiserror`-derived `ApiError`, narrowed to the failure modes a single
//! generic REST+WS venue client actually raises. Every variant eventually
//! crosses into `helm_core::EngineError::Connector` via `anyhow`, so none
//! of this needs to be `pub` outside the crate beyond what callers match
//! on directly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing credential field: {0}")]
    MissingCredential(&'static str),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("venue rejected request (code {code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("unexpected response shape: {0}")]
    MalformedResponse(String),

    #[error("websocket transport error: {0}")]
    Websocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),
}
