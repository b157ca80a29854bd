//! Prometheus metrics for the notification fan-out service.
//!
//! - Connection metrics (active connections, identities, opened, closed by reason)
//! - Event metrics (sent by target, delivered, failed)
//! - Maintenance metrics (keep-alive and sweep pass duration)

mod helpers;

pub use helpers::{encode_metrics, ConnectionMetrics, EventMetrics, MaintenanceMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "civreg";

lazy_static! {
    // ============================================================================
    // Connection Metrics
    // ============================================================================

    /// Number of registered event-stream connections
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of registered event-stream connections"
    ).unwrap();

    /// Number of identities with at least one connection
    pub static ref IDENTITIES_CONNECTED: IntGauge = register_int_gauge!(
        format!("{}_identities_connected", METRIC_PREFIX),
        "Number of identities with at least one open connection"
    ).unwrap();

    /// Connections registered
    pub static ref CONNECTIONS_OPENED: IntCounter = register_int_counter!(
        format!("{}_connections_opened_total", METRIC_PREFIX),
        "Total event-stream connections registered"
    ).unwrap();

    /// Connections removed, by reason
    pub static ref CONNECTIONS_CLOSED: IntCounterVec = register_int_counter_vec!(
        format!("{}_connections_closed_total", METRIC_PREFIX),
        "Total event-stream connections removed",
        &["reason"]
    ).unwrap();

    /// Connection lifetime
    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Event-stream connection duration in seconds",
        vec![1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]
    ).unwrap();

    // ============================================================================
    // Event Metrics
    // ============================================================================

    /// Events sent by target type
    pub static ref EVENTS_SENT_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_events_sent_total", METRIC_PREFIX),
        "Total events sent",
        &["target"]
    ).unwrap();

    /// Successful connection writes
    pub static ref EVENTS_DELIVERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_delivered_total", METRIC_PREFIX),
        "Total events successfully written to connections"
    ).unwrap();

    /// Failed connection writes
    pub static ref EVENTS_FAILED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_events_failed_total", METRIC_PREFIX),
        "Total event writes that failed"
    ).unwrap();

    // ============================================================================
    // Maintenance Metrics
    // ============================================================================

    /// Duration of keep-alive and sweep passes
    pub static ref MAINTENANCE_DURATION_MS: HistogramVec = register_histogram_vec!(
        format!("{}_maintenance_duration_ms", METRIC_PREFIX),
        "Maintenance pass duration in milliseconds",
        &["pass"],
        vec![1.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    ).unwrap();
}
