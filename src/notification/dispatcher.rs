use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;

use crate::metrics::EventMetrics;
use crate::registry::{ConnectionHandle, ConnectionRegistry, RemovalReason, WriteOutcome};
use crate::sse::SseFrame;

use super::{BroadcastOutcome, NotificationTarget};

/// Maximum number of concurrent connection writes per fan-out
const MAX_CONCURRENT_SENDS: usize = 100;

/// Statistics for the notification dispatcher
#[derive(Debug, Default)]
pub struct DispatcherStats {
    /// Events dispatched (one per notify/broadcast call)
    pub total_sent: AtomicU64,
    /// Successful connection writes
    pub total_delivered: AtomicU64,
    /// Failed connection writes
    pub total_failed: AtomicU64,
    /// Identity-targeted events
    pub identity_notifications: AtomicU64,
    /// Broadcast events
    pub broadcast_notifications: AtomicU64,
    /// Keep-alive rounds
    pub keep_alive_rounds: AtomicU64,
}

impl DispatcherStats {
    pub fn snapshot(&self) -> DispatcherStatsSnapshot {
        DispatcherStatsSnapshot {
            total_sent: self.total_sent.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            identity_notifications: self.identity_notifications.load(Ordering::Relaxed),
            broadcast_notifications: self.broadcast_notifications.load(Ordering::Relaxed),
            keep_alive_rounds: self.keep_alive_rounds.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: BroadcastOutcome) {
        self.total_delivered
            .fetch_add(outcome.success_count as u64, Ordering::Relaxed);
        self.total_failed
            .fetch_add(outcome.failure_count as u64, Ordering::Relaxed);
    }
}

/// Snapshot of dispatcher statistics
#[derive(Debug, Clone, Serialize)]
pub struct DispatcherStatsSnapshot {
    pub total_sent: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
    pub identity_notifications: u64,
    pub broadcast_notifications: u64,
    pub keep_alive_rounds: u64,
}

/// Writes events to registered connections and evicts the ones that fail
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
    write_timeout: Duration,
    stats: DispatcherStats,
}

impl NotificationDispatcher {
    pub fn new(registry: Arc<ConnectionRegistry>, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
            stats: DispatcherStats::default(),
        }
    }

    /// Get dispatcher statistics
    pub fn stats(&self) -> DispatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Dispatch an event to the specified target
    pub async fn dispatch(&self, target: NotificationTarget, event: Option<&str>) -> BroadcastOutcome {
        match target {
            NotificationTarget::Identity(identity) => {
                let connections = self.registry.connections_for(&identity);
                let outcome = self.send_to_connections(&connections, SseFrame::event(event)).await;
                self.stats.identity_notifications.fetch_add(1, Ordering::Relaxed);
                self.finish(&NotificationTarget::Identity(identity), outcome)
            }
            NotificationTarget::Broadcast => {
                let connections = self.registry.all_connections();
                let outcome = self.send_to_connections(&connections, SseFrame::event(event)).await;
                self.stats.broadcast_notifications.fetch_add(1, Ordering::Relaxed);
                self.finish(&NotificationTarget::Broadcast, outcome)
            }
        }
    }

    /// Send an event to every connection of one identity.
    ///
    /// Returns the number of connections written to; failed connections are
    /// evicted and not counted. An identity with no connections yields 0.
    #[tracing::instrument(name = "dispatcher.notify", skip(self))]
    pub async fn notify(&self, identity: &str, event: Option<&str>) -> usize {
        self.dispatch(NotificationTarget::Identity(identity.to_string()), event)
            .await
            .success_count
    }

    /// Send an event to every registered connection
    #[tracing::instrument(name = "dispatcher.broadcast", skip(self))]
    pub async fn broadcast(&self, event: Option<&str>) -> BroadcastOutcome {
        self.dispatch(NotificationTarget::Broadcast, event).await
    }

    /// Write a keep-alive comment to every connection, refreshing their activity
    pub async fn keep_alive(&self) -> BroadcastOutcome {
        let connections = self.registry.all_connections();
        let outcome = self.send_to_connections(&connections, SseFrame::KeepAlive).await;

        self.stats.keep_alive_rounds.fetch_add(1, Ordering::Relaxed);
        EventMetrics::record_sent("keep_alive");
        EventMetrics::record_failed(outcome.failure_count as u64);

        if outcome.failure_count > 0 {
            tracing::debug!(
                sent = outcome.success_count,
                failed = outcome.failure_count,
                "Keep-alive round evicted dead connections"
            );
        }

        outcome
    }

    fn finish(&self, target: &NotificationTarget, outcome: BroadcastOutcome) -> BroadcastOutcome {
        self.stats.total_sent.fetch_add(1, Ordering::Relaxed);
        self.stats.record(outcome);

        EventMetrics::record_sent(target.label());
        EventMetrics::record_delivered(outcome.success_count as u64);
        EventMetrics::record_failed(outcome.failure_count as u64);

        tracing::debug!(
            target = target.label(),
            delivered = outcome.success_count,
            failed = outcome.failure_count,
            "Event dispatched"
        );

        outcome
    }

    /// Write one frame to a snapshot of connections concurrently.
    ///
    /// Each write is bounded by the write timeout, so a stalled peer only
    /// costs its own slot. Connections that fail are evicted as their result
    /// arrives; the snapshot itself is never mutated.
    async fn send_to_connections(
        &self,
        connections: &[Arc<ConnectionHandle>],
        frame: SseFrame,
    ) -> BroadcastOutcome {
        if connections.is_empty() {
            return BroadcastOutcome::default();
        }

        let mut futures = FuturesUnordered::new();
        let mut outcome = BroadcastOutcome::default();

        for conn in connections {
            let conn = conn.clone();
            let frame = frame.clone();
            let timeout = self.write_timeout;
            futures.push(async move {
                let result = conn.write(frame, timeout).await;
                (conn, result)
            });

            // Process completed writes when we hit the concurrency limit
            while futures.len() >= MAX_CONCURRENT_SENDS {
                match futures.next().await {
                    Some((conn, result)) => self.settle(&conn, result, &mut outcome),
                    None => break,
                }
            }
        }

        while let Some((conn, result)) = futures.next().await {
            self.settle(&conn, result, &mut outcome);
        }

        outcome
    }

    fn settle(&self, conn: &ConnectionHandle, result: WriteOutcome, outcome: &mut BroadcastOutcome) {
        match result {
            WriteOutcome::Delivered => outcome.success_count += 1,
            WriteOutcome::Disconnected => {
                outcome.failure_count += 1;
                self.registry.evict(conn.id, RemovalReason::WriteFailed);
            }
        }
    }
}
