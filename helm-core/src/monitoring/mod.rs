//! Prometheus metrics registry and the HTTP server that exposes them.
//!
//! One `prometheus::Registry` wrapped by a `MetricsRegistry` whose
//! sub-structs group counters/gauges by concern, served by a small
//! `hyper` scrape server — the order-lifecycle counters this engine
//! actually produces.

pub mod metrics;
pub mod server;

pub use metrics::{MetricsRegistry, OrderMetrics, RiskMetrics, TrackingLimitMetrics};
pub use server::{MetricsServer, MetricsServerConfig};
