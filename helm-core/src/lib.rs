//! helm-core — the execution core for a multi-venue crypto trading engine.
//!
//! This crate owns the order lifecycle, the connector contract, and the
//! services that sit between a strategy and the venues it trades on: market
//! data (symbol mapping and fixed-point scaling), risk (pre-trade checks),
//! positions, the tracking-limit repricing engine, the market cache, and the
//! lifecycle controller that starts/stops a connector and its background
//! tasks. Strategy decision logic, per-venue wire protocols, and persistence
//! beyond an append-only event log live outside this crate.

pub mod config;
pub mod connector;
pub mod core;
pub mod heartbeat;
pub mod lifecycle;
pub mod market_cache;
pub mod market_data;
pub mod monitoring;
pub mod order_service;
pub mod position;
pub mod risk;
pub mod router;
pub mod tracking_limit;
pub mod utils;

pub use crate::core::errors::EngineError;
pub use crate::core::order::Order;
pub use crate::core::types::{
    CanonicalSymbol, OrderState, Side, TopOfBook, VenueId, VenueSymbol,
};
pub use crate::router::ExecutionRouter;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Convenient re-exports for binaries and connector implementations.
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::connector::{
        Connector, LimitOrderRequest, MarketOrderRequest, VenueOrderSnapshot, VenueOrderUpdate,
        VenuePosition,
    };
    pub use crate::core::errors::EngineError;
    pub use crate::core::order::Order;
    pub use crate::core::types::{CanonicalSymbol, OrderState, Side, TopOfBook, VenueId, VenueSymbol};
    pub use crate::lifecycle::LifecycleController;
    pub use crate::router::ExecutionRouter;
    pub use crate::Result;
}
