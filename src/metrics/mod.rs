// Private module declaration
mod server;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

// Re-export for public API
pub use server::configure as configure_routes;

// ============================================================================
// Metrics Module - Prometheus metrics for observability
// ============================================================================
//
// Provides metrics for:
// - Order placement (created, rejected by reason)
// - Status transitions (labelled from/to)
// - Stock movements (units reserved and restored)
// - Engine operation latency
//
// All metrics are registered with Prometheus and can be scraped via /metrics
// ============================================================================

/// Central metrics registry for the entire application
pub struct Metrics {
    registry: Registry,

    // Order placement
    pub orders_created: IntCounter,
    pub orders_rejected: IntCounterVec,

    // Lifecycle
    pub status_transitions: IntCounterVec,

    // Inventory
    pub stock_units_reserved: IntCounter,
    pub stock_units_restored: IntCounter,

    // Latency
    pub operation_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("orders_created_total", "Total orders placed")?;
        registry.register(Box::new(orders_created.clone()))?;

        let orders_rejected = IntCounterVec::new(
            Opts::new("order_rejections_total", "Order placements rejected, by error"),
            &["reason"],
        )?;
        registry.register(Box::new(orders_rejected.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("order_status_transitions_total", "Committed order status transitions"),
            &["from", "to"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        let stock_units_reserved = IntCounter::new(
            "stock_units_reserved_total",
            "Units taken from stock by placed orders",
        )?;
        registry.register(Box::new(stock_units_reserved.clone()))?;

        let stock_units_restored = IntCounter::new(
            "stock_units_restored_total",
            "Units returned to stock by cancellations",
        )?;
        registry.register(Box::new(stock_units_restored.clone()))?;

        let operation_duration = HistogramVec::new(
            HistogramOpts::new("order_operation_duration_seconds", "Order engine operation duration")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation"],
        )?;
        registry.register(Box::new(operation_duration.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            orders_rejected,
            status_transitions,
            stock_units_reserved,
            stock_units_restored,
            operation_duration,
        })
    }

    /// Get the Prometheus registry for exposing metrics via HTTP
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observe_operation(&self, operation: &str, duration_secs: f64) {
        self.operation_duration.with_label_values(&[operation]).observe(duration_secs);
    }

    /// Helper to record a placed order and the units it reserved
    pub fn record_order_created(&self, units: i32) {
        self.orders_created.inc();
        self.stock_units_reserved.inc_by(units.max(0) as u64);
    }

    pub fn record_order_rejected(&self, reason: &str) {
        self.orders_rejected.with_label_values(&[reason]).inc();
    }

    pub fn record_status_transition(&self, from: &str, to: &str) {
        self.status_transitions.with_label_values(&[from, to]).inc();
    }

    pub fn record_stock_restored(&self, units: i32) {
        self.stock_units_restored.inc_by(units.max(0) as u64);
    }
}
