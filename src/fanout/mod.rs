//! Connection registry and notification fan-out service.
//!
//! [`FanoutService`] is the one object the HTTP layer talks to. It owns the
//! registry, the dispatcher, and the background heartbeat task, and exposes
//! the operations route handlers need:
//!
//! - `register` / `unregister` for the event-stream endpoint
//! - `notify` / `broadcast` (and their detached variants) for triggers
//! - `reclaim` for the periodic sweep
//!
//! Delivery is best-effort and at most once per live connection. A failed
//! write removes the connection and only lowers the returned count.
//!
//! The registry is process-local: with several server processes, each one
//! reaches only its own connections.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::StreamConfig;
use crate::notification::{BroadcastOutcome, DispatcherStatsSnapshot, NotificationDispatcher};
use crate::registry::{
    ConnectionHandle, ConnectionId, ConnectionRegistry, ConnectionStats, EventSink, RemovalReason,
};
use crate::tasks::HeartbeatTask;

/// How long `stop` waits for the heartbeat task before abandoning it
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FanoutService {
    config: StreamConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
    shutdown_tx: broadcast::Sender<()>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl FanoutService {
    pub fn new(config: StreamConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            registry.clone(),
            config.write_timeout(),
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            registry,
            dispatcher,
            shutdown_tx,
            heartbeat: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Start the keep-alive and sweep task.
    ///
    /// Only the first call spawns anything; later calls return `false` until
    /// [`stop`](Self::stop) has run. Must be called inside a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut heartbeat = self
            .heartbeat
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if heartbeat.is_some() {
            return false;
        }

        let task = HeartbeatTask::new(
            self.config.clone(),
            self.registry.clone(),
            self.dispatcher.clone(),
            self.shutdown_tx.subscribe(),
        );
        *heartbeat = Some(tokio::spawn(task.run()));

        tracing::info!("Fan-out service started");
        true
    }

    pub fn is_running(&self) -> bool {
        self.heartbeat
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop the background task. Registered connections stay open.
    pub async fn stop(&self) -> bool {
        let handle = self
            .heartbeat
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();

        let Some(handle) = handle else {
            return false;
        };

        let _ = self.shutdown_tx.send(());
        join_or_abort(handle, STOP_TIMEOUT).await;

        tracing::info!("Fan-out service stopped");
        true
    }

    /// Add a connection for `identity`. Sends nothing on its own.
    pub fn register(&self, identity: impl Into<String>, sink: Arc<dyn EventSink>) -> Arc<ConnectionHandle> {
        self.registry.register(identity, sink)
    }

    /// Remove a connection; unknown ids are ignored
    pub fn unregister(&self, connection_id: ConnectionId) -> bool {
        self.registry.unregister(connection_id)
    }

    /// Unregister after the transport reported the client gone
    pub fn disconnect(&self, connection_id: ConnectionId) -> bool {
        self.registry
            .remove(connection_id, RemovalReason::Client)
            .is_some()
    }

    /// Deliver `event` (default `update`) to every connection of `identity`
    pub async fn notify(&self, identity: &str, event: Option<&str>) -> usize {
        self.dispatcher.notify(identity, event).await
    }

    /// Deliver `event` (default `update`) to every connection
    pub async fn broadcast(&self, event: Option<&str>) -> BroadcastOutcome {
        self.dispatcher.broadcast(event).await
    }

    /// Fire-and-forget variant of [`notify`](Self::notify)
    pub fn notify_detached(&self, identity: impl Into<String>, event: Option<String>) -> JoinHandle<usize> {
        let dispatcher = self.dispatcher.clone();
        let identity = identity.into();
        tokio::spawn(async move { dispatcher.notify(&identity, event.as_deref()).await })
    }

    /// Fire-and-forget variant of [`broadcast`](Self::broadcast)
    pub fn broadcast_detached(&self, event: Option<String>) -> JoinHandle<BroadcastOutcome> {
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move { dispatcher.broadcast(event.as_deref()).await })
    }

    /// Evict connections idle for longer than `stale_threshold` as of `now`
    pub fn reclaim(&self, now: DateTime<Utc>, stale_threshold: Duration) -> usize {
        self.registry.reclaim(now, stale_threshold)
    }

    /// Close every connection. Used during shutdown.
    pub fn close_all(&self) -> usize {
        self.registry.close_all()
    }

    pub fn stats(&self) -> ConnectionStats {
        self.registry.stats()
    }

    pub fn dispatcher_stats(&self) -> DispatcherStatsSnapshot {
        self.dispatcher.stats()
    }
}

/// Wait for `handle` up to `timeout`, aborting the task if it overruns so a
/// later `start` never runs beside it. Returns whether it finished on its own.
async fn join_or_abort(mut handle: JoinHandle<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Heartbeat task ended abnormally");
            true
        }
        Err(_) => {
            tracing::warn!("Heartbeat task did not stop in time, aborting");
            handle.abort();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelSink;

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let service = FanoutService::new(StreamConfig::default());

        assert!(service.start());
        assert!(!service.start());
        assert!(service.is_running());

        assert!(service.stop().await);
        assert!(!service.is_running());
        assert!(!service.stop().await);

        // Restart after stop is allowed
        assert!(service.start());
        assert!(service.stop().await);
    }

    #[tokio::test]
    async fn test_overrunning_task_is_aborted() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let stuck = tokio::spawn(async move {
            let _tx = tx;
            std::future::pending::<()>().await;
        });

        assert!(!join_or_abort(stuck, Duration::from_millis(20)).await);
        // The sender is dropped only once the task is gone
        let closed = tokio::time::timeout(Duration::from_secs(1), rx).await;
        assert!(matches!(closed, Ok(Err(_))));
    }

    #[tokio::test]
    async fn test_disconnect_removes_once() {
        let service = FanoutService::new(StreamConfig::default());
        let (sink, _rx) = ChannelSink::channel(4);
        let handle = service.register("u1", Arc::new(sink));

        assert!(service.disconnect(handle.id));
        assert!(!service.disconnect(handle.id));
        assert!(!service.unregister(handle.id));
    }

    #[tokio::test]
    async fn test_stop_leaves_connections_registered() {
        let service = FanoutService::new(StreamConfig::default());
        service.start();

        let (sink, _rx) = ChannelSink::channel(4);
        let handle = service.register("u1", Arc::new(sink));

        service.stop().await;
        assert!(service.registry().contains(handle.id));
        assert_eq!(service.close_all(), 1);
    }

    #[tokio::test]
    async fn test_detached_notify() {
        let service = FanoutService::new(StreamConfig::default());
        let (sink, mut rx) = ChannelSink::channel(4);
        service.register("u1", Arc::new(sink));

        let delivered = service
            .notify_detached("u1", Some("feedback.created".to_string()))
            .await
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(rx.recv().await.unwrap().name(), Some("feedback.created"));

        let outcome = service.broadcast_detached(None).await.unwrap();
        assert_eq!(outcome, BroadcastOutcome::new(1, 0));
    }
}
