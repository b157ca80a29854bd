//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    CONNECTIONS_ACTIVE, CONNECTIONS_CLOSED, CONNECTIONS_OPENED, CONNECTION_DURATION,
    EVENTS_DELIVERED_TOTAL, EVENTS_FAILED_TOTAL, EVENTS_SENT_TOTAL, IDENTITIES_CONNECTED,
    MAINTENANCE_DURATION_MS,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording connection lifecycle metrics
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_opened() {
        CONNECTIONS_OPENED.inc();
    }

    /// Record a removal; `reason` is a `RemovalReason` label
    pub fn record_closed(reason: &str, duration_secs: f64) {
        CONNECTIONS_CLOSED.with_label_values(&[reason]).inc();
        CONNECTION_DURATION.observe(duration_secs);
    }

    pub fn set_active(connections: usize, identities: usize) {
        CONNECTIONS_ACTIVE.set(connections as i64);
        IDENTITIES_CONNECTED.set(identities as i64);
    }
}

/// Helper struct for recording event delivery metrics
pub struct EventMetrics;

impl EventMetrics {
    /// Record an event sent; `target` is `identity`, `broadcast` or `keep_alive`
    pub fn record_sent(target: &str) {
        EVENTS_SENT_TOTAL.with_label_values(&[target]).inc();
    }

    pub fn record_delivered(count: u64) {
        EVENTS_DELIVERED_TOTAL.inc_by(count);
    }

    pub fn record_failed(count: u64) {
        EVENTS_FAILED_TOTAL.inc_by(count);
    }
}

/// Helper struct for maintenance task metrics
pub struct MaintenanceMetrics;

impl MaintenanceMetrics {
    pub fn record_duration_ms(pass: &str, duration_ms: u64) {
        MAINTENANCE_DURATION_MS
            .with_label_values(&[pass])
            .observe(duration_ms as f64);
    }
}
