use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;

use crate::config::StreamConfig;
use crate::metrics::MaintenanceMetrics;
use crate::notification::NotificationDispatcher;
use crate::registry::ConnectionRegistry;

/// Background task for keep-alive writes and stale-connection reclamation.
///
/// The two passes run on independent timers and share the registry's
/// snapshot discipline, so neither holds a lock while writing.
pub struct HeartbeatTask {
    config: StreamConfig,
    registry: Arc<ConnectionRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
    shutdown: broadcast::Receiver<()>,
}

impl HeartbeatTask {
    pub fn new(
        config: StreamConfig,
        registry: Arc<ConnectionRegistry>,
        dispatcher: Arc<NotificationDispatcher>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            registry,
            dispatcher,
            shutdown,
        }
    }

    /// Run until a shutdown signal arrives
    pub async fn run(mut self) {
        let mut keep_alive_timer = tokio::time::interval(self.config.keep_alive_interval());
        let mut sweep_timer = tokio::time::interval(self.config.sweep_interval());

        // Skip immediate first tick
        keep_alive_timer.tick().await;
        sweep_timer.tick().await;

        tracing::info!(
            keep_alive_interval_secs = self.config.keep_alive_interval,
            sweep_interval_secs = self.config.sweep_interval,
            stale_threshold_secs = self.config.stale_threshold,
            "Heartbeat task started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("Heartbeat task received shutdown signal");
                    break;
                }
                _ = keep_alive_timer.tick() => {
                    self.send_keep_alives().await;
                }
                _ = sweep_timer.tick() => {
                    self.reclaim_stale_connections();
                }
            }
        }

        tracing::info!("Heartbeat task stopped");
    }

    async fn send_keep_alives(&self) {
        if self.registry.is_empty() {
            return;
        }

        let start = Instant::now();
        let outcome = self.dispatcher.keep_alive().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        MaintenanceMetrics::record_duration_ms("keep_alive", elapsed_ms);

        tracing::debug!(
            sent = outcome.success_count,
            failed = outcome.failure_count,
            elapsed_ms = elapsed_ms,
            "Keep-alive round completed"
        );

        // Warn if the round is eating into the interval
        let budget = Duration::from_secs(self.config.keep_alive_interval) / 2;
        if start.elapsed() > budget {
            tracing::warn!(
                elapsed_ms = elapsed_ms,
                keep_alive_interval_secs = self.config.keep_alive_interval,
                connections = outcome.attempted(),
                "Keep-alive round took more than 50% of interval"
            );
        }
    }

    fn reclaim_stale_connections(&self) {
        let start = Instant::now();
        let removed = self
            .registry
            .reclaim(Utc::now(), self.config.stale_threshold());

        MaintenanceMetrics::record_duration_ms("sweep", start.elapsed().as_millis() as u64);

        if removed > 0 {
            tracing::info!(
                removed = removed,
                stale_threshold_secs = self.config.stale_threshold,
                "Reclaimed stale connections"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ChannelSink;
    use crate::sse::SseFrame;

    fn components() -> (Arc<ConnectionRegistry>, Arc<NotificationDispatcher>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let dispatcher = Arc::new(NotificationDispatcher::new(
            registry.clone(),
            Duration::from_millis(200),
        ));
        (registry, dispatcher)
    }

    #[tokio::test]
    async fn test_heartbeat_task_shutdown() {
        let (registry, dispatcher) = components();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let task = HeartbeatTask::new(StreamConfig::default(), registry, dispatcher, shutdown_rx);
        let handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown_tx.send(()).unwrap();

        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("Task should complete")
            .expect("Task should not panic");
    }

    #[tokio::test]
    async fn test_keep_alive_sent_to_connections() {
        let config = StreamConfig {
            keep_alive_interval: 1,
            stale_threshold: 60,
            sweep_interval: 60,
            write_timeout_ms: 200,
            ..Default::default()
        };
        let (registry, dispatcher) = components();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let (sink, mut rx) = ChannelSink::channel(10);
        registry.register("u1", Arc::new(sink));

        let task = HeartbeatTask::new(config, registry, dispatcher, shutdown_rx);
        let task_handle = tokio::spawn(task.run());

        let frame = tokio::time::timeout(Duration::from_secs(3), rx.recv())
            .await
            .expect("Should receive keep-alive")
            .expect("Channel should not be closed");
        assert_eq!(frame, SseFrame::KeepAlive);

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }

    #[tokio::test]
    async fn test_sweep_reclaims_abandoned_connections() {
        let config = StreamConfig {
            keep_alive_interval: 1,
            stale_threshold: 2,
            sweep_interval: 1,
            write_timeout_ms: 200,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        let (registry, dispatcher) = components();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        // Receiver kept alive but never read: keep-alives queue up unread
        let (sink, _rx) = ChannelSink::channel(10);
        let handle = registry.register("u1", Arc::new(sink));

        let task = HeartbeatTask::new(config, registry.clone(), dispatcher, shutdown_rx);
        let task_handle = tokio::spawn(task.run());

        tokio::time::sleep(Duration::from_millis(4500)).await;
        assert!(!registry.contains(handle.id));

        shutdown_tx.send(()).unwrap();
        let _ = task_handle.await;
    }
}
