//! Prometheus metrics for the order lifecycle this engine actually drives.
//!
//! One `prometheus::Registry`, each concern behind its own struct of
//! counters/gauges: order submission, fills, cancellations, risk
//! rejections, and tracking-limit repricing.

use anyhow::{Context, Result};
use prometheus::{CounterVec, GaugeVec, HistogramVec, IntCounterVec, Opts, Registry};

const NAMESPACE: &str = "helm";

/// Order submission, fill, cancellation and rejection counters, labeled by
/// venue/symbol/side so a single dashboard covers every configured market.
pub struct OrderMetrics {
    pub orders_submitted_total: IntCounterVec,
    pub orders_open: GaugeVec,
    pub orders_filled_total: IntCounterVec,
    pub orders_partially_filled_total: IntCounterVec,
    pub orders_cancelled_total: IntCounterVec,
    pub orders_failed_total: IntCounterVec,
    pub fill_volume_base_total: CounterVec,
    pub connector_errors_total: IntCounterVec,
    pub order_lifetime_seconds: HistogramVec,
}

impl OrderMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let labels = &["venue", "symbol", "side"];

        let orders_submitted_total = IntCounterVec::new(
            Opts::new("orders_submitted_total", "Orders submitted to a venue connector")
                .namespace(NAMESPACE),
            labels,
        )?;
        let orders_open = GaugeVec::new(
            Opts::new("orders_open", "Orders currently open or partially filled")
                .namespace(NAMESPACE),
            &["venue", "symbol"],
        )?;
        let orders_filled_total = IntCounterVec::new(
            Opts::new("orders_filled_total", "Orders that reached the Filled terminal state")
                .namespace(NAMESPACE),
            labels,
        )?;
        let orders_partially_filled_total = IntCounterVec::new(
            Opts::new(
                "orders_partially_filled_total",
                "Order update events observed in the PartiallyFilled state",
            )
            .namespace(NAMESPACE),
            labels,
        )?;
        let orders_cancelled_total = IntCounterVec::new(
            Opts::new("orders_cancelled_total", "Orders that reached the Cancelled terminal state")
                .namespace(NAMESPACE),
            labels,
        )?;
        let orders_failed_total = IntCounterVec::new(
            Opts::new("orders_failed_total", "Orders that reached the Failed terminal state")
                .namespace(NAMESPACE),
            labels,
        )?;
        let fill_volume_base_total = CounterVec::new(
            Opts::new(
                "fill_volume_base_total",
                "Cumulative filled base-asset size, in base units (not scaled ticks)",
            )
            .namespace(NAMESPACE),
            labels,
        )?;
        let connector_errors_total = IntCounterVec::new(
            Opts::new("connector_errors_total", "Errors returned by a venue connector call")
                .namespace(NAMESPACE),
            &["venue", "operation"],
        )?;
        let order_lifetime_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "order_lifetime_seconds",
                "Time from order submission to terminal state",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["venue", "symbol"],
        )?;

        registry.register(Box::new(orders_submitted_total.clone()))?;
        registry.register(Box::new(orders_open.clone()))?;
        registry.register(Box::new(orders_filled_total.clone()))?;
        registry.register(Box::new(orders_partially_filled_total.clone()))?;
        registry.register(Box::new(orders_cancelled_total.clone()))?;
        registry.register(Box::new(orders_failed_total.clone()))?;
        registry.register(Box::new(fill_volume_base_total.clone()))?;
        registry.register(Box::new(connector_errors_total.clone()))?;
        registry.register(Box::new(order_lifetime_seconds.clone()))?;

        Ok(Self {
            orders_submitted_total,
            orders_open,
            orders_filled_total,
            orders_partially_filled_total,
            orders_cancelled_total,
            orders_failed_total,
            fill_volume_base_total,
            connector_errors_total,
            order_lifetime_seconds,
        })
    }
}

/// Pre-trade risk check outcomes, labeled by the rule that rejected the
/// order (`min_size`, `position_cap`, `notional_cap`).
pub struct RiskMetrics {
    pub risk_violations_total: IntCounterVec,
    pub position_notional: GaugeVec,
}

impl RiskMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let risk_violations_total = IntCounterVec::new(
            Opts::new("risk_violations_total", "Orders rejected by pre-trade risk checks")
                .namespace(NAMESPACE),
            &["venue", "symbol", "rule"],
        )?;
        let position_notional = GaugeVec::new(
            Opts::new("position_notional", "Last known notional exposure per symbol")
                .namespace(NAMESPACE),
            &["symbol"],
        )?;

        registry.register(Box::new(risk_violations_total.clone()))?;
        registry.register(Box::new(position_notional.clone()))?;

        Ok(Self {
            risk_violations_total,
            position_notional,
        })
    }
}

/// Tracking-limit repricing loop counters: attempts, timeouts (interval
/// elapsed before a fill), and the cancellations issued to reprice.
pub struct TrackingLimitMetrics {
    pub attempts_total: IntCounterVec,
    pub timeouts_total: IntCounterVec,
    pub cancellations_total: IntCounterVec,
}

impl TrackingLimitMetrics {
    fn register(registry: &Registry) -> Result<Self> {
        let attempts_total = IntCounterVec::new(
            Opts::new("tracking_limit_attempts_total", "Repricing attempts issued")
                .namespace(NAMESPACE),
            &["venue", "symbol", "side"],
        )?;
        let timeouts_total = IntCounterVec::new(
            Opts::new(
                "tracking_limit_timeouts_total",
                "Repricing intervals that elapsed without a fill",
            )
            .namespace(NAMESPACE),
            &["venue", "symbol", "side"],
        )?;
        let cancellations_total = IntCounterVec::new(
            Opts::new(
                "tracking_limit_cancellations_total",
                "Cancel-and-reprice cycles issued by the tracking limit engine",
            )
            .namespace(NAMESPACE),
            &["venue", "symbol", "side"],
        )?;

        registry.register(Box::new(attempts_total.clone()))?;
        registry.register(Box::new(timeouts_total.clone()))?;
        registry.register(Box::new(cancellations_total.clone()))?;

        Ok(Self {
            attempts_total,
            timeouts_total,
            cancellations_total,
        })
    }
}

/// Owns the `prometheus::Registry` plus one sub-struct per concern. Cheap
/// to construct once at startup and shared behind an `Arc` with every
/// service that wants to record something.
pub struct MetricsRegistry {
    registry: Registry,
    orders: OrderMetrics,
    risk: RiskMetrics,
    tracking_limit: TrackingLimitMetrics,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let orders = OrderMetrics::register(&registry).context("registering order metrics")?;
        let risk = RiskMetrics::register(&registry).context("registering risk metrics")?;
        let tracking_limit = TrackingLimitMetrics::register(&registry)
            .context("registering tracking limit metrics")?;

        Ok(Self {
            registry,
            orders,
            risk,
            tracking_limit,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn orders(&self) -> &OrderMetrics {
        &self.orders
    }

    pub fn risk(&self) -> &RiskMetrics {
        &self.risk
    }

    pub fn tracking_limit(&self) -> &TrackingLimitMetrics {
        &self.tracking_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registers_without_duplicate_metric_names() {
        let registry = MetricsRegistry::new().unwrap();
        assert!(!registry.registry().gather().is_empty());
    }

    #[test]
    fn order_counters_increment_and_gather() {
        let registry = MetricsRegistry::new().unwrap();
        registry
            .orders()
            .orders_submitted_total
            .with_label_values(&["coinbase", "BTC-USD", "buy"])
            .inc();
        registry
            .orders()
            .orders_filled_total
            .with_label_values(&["coinbase", "BTC-USD", "buy"])
            .inc();

        let families = registry.registry().gather();
        let names: Vec<_> = families.iter().map(|f| f.get_name().to_string()).collect();
        assert!(names.contains(&"helm_orders_submitted_total".to_string()));
        assert!(names.contains(&"helm_orders_filled_total".to_string()));
    }

    #[test]
    fn risk_violations_labeled_by_rule() {
        let registry = MetricsRegistry::new().unwrap();
        registry
            .risk()
            .risk_violations_total
            .with_label_values(&["coinbase", "BTC-USD", "notional_cap"])
            .inc();
        let families = registry.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "helm_risk_violations_total"));
    }

    #[test]
    fn tracking_limit_counters_gather() {
        let registry = MetricsRegistry::new().unwrap();
        registry
            .tracking_limit()
            .attempts_total
            .with_label_values(&["coinbase", "BTC-USD", "sell"])
            .inc();
        registry
            .tracking_limit()
            .timeouts_total
            .with_label_values(&["coinbase", "BTC-USD", "sell"])
            .inc();
        let families = registry.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "helm_tracking_limit_attempts_total"));
    }
}
