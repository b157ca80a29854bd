use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::metrics::ConnectionMetrics;

use super::{ConnectionHandle, ConnectionId, ConnectionStats, EventSink};

/// Why a connection left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalReason {
    /// Transport reported the client went away
    Client,
    /// Removed through the programmatic API
    Unregistered,
    /// A write to the connection failed or timed out
    WriteFailed,
    /// Idle past the stale threshold
    Sweep,
    /// Process shutdown
    Shutdown,
}

impl RemovalReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Unregistered => "unregistered",
            Self::WriteFailed => "write_failed",
            Self::Sweep => "sweep",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Live set of event-stream connections, indexed by identity.
///
/// Both maps are sharded-lock `DashMap`s. Readers take snapshots
/// (`Vec<Arc<ConnectionHandle>>`) and never hold a guard across I/O.
pub struct ConnectionRegistry {
    /// connection_id -> ConnectionHandle
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// identity -> Set<connection_id> (one entry per open tab/device)
    identity_index: DashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            identity_index: DashMap::new(),
        }
    }

    /// Register a new connection for `identity`. Last activity starts at now.
    pub fn register(&self, identity: impl Into<String>, sink: Arc<dyn EventSink>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(identity.into(), sink));
        let conn_id = handle.id;

        self.connections.insert(conn_id, handle.clone());
        self.identity_index
            .entry(handle.identity.clone())
            .or_default()
            .insert(conn_id);

        ConnectionMetrics::record_opened();
        self.publish_gauges();

        tracing::info!(connection_id = %conn_id, identity = %handle.identity, "Connection registered");

        handle
    }

    /// Remove a connection. Unknown or already removed ids are a no-op.
    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        self.remove(connection_id, RemovalReason::Unregistered).is_some()
    }

    /// Remove a connection and hand back its handle so the caller can close it
    pub fn remove(&self, connection_id: ConnectionId, reason: RemovalReason) -> Option<Arc<ConnectionHandle>> {
        let (_, handle) = self.connections.remove(&connection_id)?;

        if let Some(mut ids) = self.identity_index.get_mut(&handle.identity) {
            ids.remove(&connection_id);
        }
        // Re-checked under the shard lock so a concurrent register is never dropped
        self.identity_index
            .remove_if(&handle.identity, |_, ids| ids.is_empty());

        let duration = Utc::now()
            .signed_duration_since(handle.connected_at)
            .num_milliseconds() as f64
            / 1000.0;
        ConnectionMetrics::record_closed(reason.as_str(), duration);
        self.publish_gauges();

        tracing::info!(
            connection_id = %connection_id,
            identity = %handle.identity,
            reason = reason.as_str(),
            duration_secs = duration,
            "Connection unregistered"
        );

        Some(handle)
    }

    /// Remove a connection and close its transport, logging close failures
    pub fn evict(&self, connection_id: ConnectionId, reason: RemovalReason) -> bool {
        match self.remove(connection_id, reason) {
            Some(handle) => {
                if let Err(e) = handle.close() {
                    tracing::debug!(
                        connection_id = %connection_id,
                        error = %e,
                        "Transport already closed during eviction"
                    );
                }
                true
            }
            None => false,
        }
    }

    /// Snapshot of the connections owned by `identity`
    pub fn connections_for(&self, identity: &str) -> Vec<Arc<ConnectionHandle>> {
        let ids: Vec<ConnectionId> = self
            .identity_index
            .get(identity)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        ids.iter()
            .filter_map(|id| self.connections.get(id).map(|h| h.clone()))
            .collect()
    }

    /// Snapshot of every registered connection
    pub fn all_connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    pub fn get(&self, connection_id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.connections.contains_key(&connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn connection_count_for(&self, identity: &str) -> usize {
        self.identity_index
            .get(identity)
            .map(|ids| ids.len())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> ConnectionStats {
        ConnectionStats {
            total_connections: self.connections.len(),
            unique_identities: self.identity_index.len(),
        }
    }

    /// Connections whose last activity is strictly older than `now - stale_threshold`
    pub fn stale_connections(&self, now: DateTime<Utc>, stale_threshold: Duration) -> Vec<Arc<ConnectionHandle>> {
        self.connections
            .iter()
            .filter(|entry| entry.value().is_stale(now, stale_threshold))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Evict every stale connection and close its transport.
    ///
    /// Close failures are logged and do not stop the pass. Returns the number
    /// of connections removed by this call.
    pub fn reclaim(&self, now: DateTime<Utc>, stale_threshold: Duration) -> usize {
        let stale = self.stale_connections(now, stale_threshold);
        let mut reclaimed = 0;

        for handle in stale {
            // Re-check: a write may have refreshed it since the snapshot
            if !handle.is_stale(now, stale_threshold) {
                continue;
            }
            if self.remove(handle.id, RemovalReason::Sweep).is_none() {
                continue;
            }
            reclaimed += 1;

            tracing::info!(
                connection_id = %handle.id,
                identity = %handle.identity,
                last_activity = %handle.last_activity(),
                "Reclaimed stale connection"
            );

            if let Err(e) = handle.close() {
                tracing::warn!(
                    connection_id = %handle.id,
                    error = %e,
                    "Failed to close stale connection"
                );
            }
        }

        reclaimed
    }

    /// Remove and close every connection. Used on shutdown.
    pub fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|r| *r.key()).collect();
        ids.into_iter()
            .filter(|id| self.evict(*id, RemovalReason::Shutdown))
            .count()
    }

    fn publish_gauges(&self) {
        ConnectionMetrics::set_active(self.connections.len(), self.identity_index.len());
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ChannelSink, SinkError};
    use crate::sse::SseFrame;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn channel_sink() -> (Arc<dyn EventSink>, tokio::sync::mpsc::Receiver<SseFrame>) {
        let (sink, rx) = ChannelSink::channel(8);
        (Arc::new(sink), rx)
    }

    /// Sink whose close always fails, as if the transport were already torn down
    struct BrokenCloseSink {
        closes: AtomicUsize,
    }

    #[async_trait]
    impl EventSink for BrokenCloseSink {
        async fn write(&self, _frame: SseFrame) -> Result<(), SinkError> {
            Ok(())
        }

        fn close(&self) -> Result<(), SinkError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::Closed)
        }
    }

    #[test]
    fn test_register_indexes_by_identity() {
        let registry = ConnectionRegistry::new();
        let (s1, _r1) = channel_sink();
        let (s2, _r2) = channel_sink();
        let (s3, _r3) = channel_sink();

        let c1 = registry.register("u1", s1);
        let c2 = registry.register("u1", s2);
        let c3 = registry.register("u2", s3);

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.connection_count_for("u1"), 2);
        assert_eq!(registry.connection_count_for("u2"), 1);
        assert_eq!(registry.connection_count_for("nobody"), 0);

        let ids: HashSet<_> = registry.connections_for("u1").iter().map(|h| h.id).collect();
        assert!(ids.contains(&c1.id) && ids.contains(&c2.id));
        assert!(!ids.contains(&c3.id));

        let stats = registry.stats();
        assert_eq!(stats.total_connections, 3);
        assert_eq!(stats.unique_identities, 2);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (s1, _r1) = channel_sink();
        let (s2, _r2) = channel_sink();
        let c1 = registry.register("u1", s1);
        let c2 = registry.register("u1", s2);

        assert!(registry.unregister(c1.id));
        assert!(!registry.unregister(c1.id));
        assert!(!registry.unregister(uuid::Uuid::new_v4()));

        assert!(registry.contains(c2.id));
        assert_eq!(registry.connection_count_for("u1"), 1);
    }

    #[test]
    fn test_removal_reason_reaches_metrics() {
        let registry = ConnectionRegistry::new();
        let (s1, _r1) = channel_sink();
        let (s2, _r2) = channel_sink();
        let c1 = registry.register("u1", s1);
        let c2 = registry.register("u1", s2);

        assert!(registry.unregister(c1.id));
        assert!(registry.remove(c2.id, RemovalReason::Client).is_some());

        let output = crate::metrics::encode_metrics().unwrap();
        assert!(output.contains(r#"reason="unregistered""#));
        assert!(output.contains(r#"reason="client""#));
    }

    #[test]
    fn test_identity_index_dropped_with_last_connection() {
        let registry = ConnectionRegistry::new();
        let (s1, _r1) = channel_sink();
        let c1 = registry.register("u1", s1);

        registry.unregister(c1.id);
        assert_eq!(registry.stats().unique_identities, 0);
        assert!(registry.connections_for("u1").is_empty());
    }

    #[tokio::test]
    async fn test_evict_closes_transport() {
        let registry = ConnectionRegistry::new();
        let (s1, mut r1) = channel_sink();
        let c1 = registry.register("u1", s1);

        assert!(registry.evict(c1.id, RemovalReason::WriteFailed));
        assert!(!registry.contains(c1.id));
        assert!(r1.recv().await.is_none());
    }

    #[test]
    fn test_reclaim_only_after_threshold() {
        let registry = ConnectionRegistry::new();
        let (s1, _r1) = channel_sink();
        let c1 = registry.register("u1", s1);
        let threshold = Duration::from_secs(60);
        let last = c1.last_activity();

        assert_eq!(registry.reclaim(last + chrono::Duration::seconds(30), threshold), 0);
        assert_eq!(registry.reclaim(last + chrono::Duration::seconds(60), threshold), 0);
        assert!(registry.contains(c1.id));

        assert_eq!(registry.reclaim(last + chrono::Duration::seconds(61), threshold), 1);
        assert!(!registry.contains(c1.id));
        assert_eq!(registry.reclaim(last + chrono::Duration::seconds(61), threshold), 0);
    }

    #[test]
    fn test_reclaim_continues_past_close_failures() {
        let registry = ConnectionRegistry::new();
        let broken = Arc::new(BrokenCloseSink {
            closes: AtomicUsize::new(0),
        });
        registry.register("u1", broken.clone());
        registry.register("u2", broken.clone());
        let (s3, _r3) = channel_sink();
        registry.register("u3", s3);

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(registry.reclaim(later, Duration::from_secs(60)), 3);
        assert_eq!(broken.closes.load(Ordering::SeqCst), 2);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_all() {
        let registry = ConnectionRegistry::new();
        for i in 0..4 {
            let (s, _r) = channel_sink();
            registry.register(format!("u{}", i % 2), s);
        }

        assert_eq!(registry.close_all(), 4);
        assert!(registry.is_empty());
        assert_eq!(registry.stats().unique_identities, 0);
    }
}
