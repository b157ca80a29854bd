//! Graceful shutdown handling for the fan-out service.
//!
//! 1. Stops the heartbeat task so no sweep or keep-alive races the teardown
//! 2. Closes every registered connection, ending each client's event stream

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::fanout::FanoutService;

/// Handles graceful shutdown of the fan-out service
pub struct GracefulShutdown {
    fanout: Arc<FanoutService>,
}

impl GracefulShutdown {
    pub fn new(fanout: Arc<FanoutService>) -> Self {
        Self { fanout }
    }

    /// Execute the shutdown sequence
    #[tracing::instrument(
        name = "graceful_shutdown",
        skip(self),
        fields(total_connections = self.fanout.stats().total_connections)
    )]
    pub async fn execute(&self, reason: &str) -> ShutdownResult {
        let start = Instant::now();

        tracing::info!(reason = %reason, "Starting graceful shutdown - stopping heartbeat task");
        let heartbeat_stopped = self.fanout.stop().await;

        tracing::info!("Closing event-stream connections");
        let connections_closed = self.fanout.close_all();

        let result = ShutdownResult {
            heartbeat_stopped,
            connections_closed,
            duration: start.elapsed(),
        };

        tracing::info!(
            heartbeat_stopped = result.heartbeat_stopped,
            connections_closed = result.connections_closed,
            duration_ms = result.duration.as_millis(),
            "Graceful shutdown completed"
        );

        result
    }
}

/// Result of a graceful shutdown operation
#[derive(Debug, Default)]
pub struct ShutdownResult {
    /// Whether a running heartbeat task was stopped
    pub heartbeat_stopped: bool,
    /// Number of connections closed
    pub connections_closed: usize,
    /// Total time taken for shutdown
    pub duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StreamConfig;
    use crate::registry::ChannelSink;

    #[tokio::test]
    async fn test_shutdown_no_connections() {
        let fanout = Arc::new(FanoutService::new(StreamConfig::default()));
        let result = GracefulShutdown::new(fanout).execute("test shutdown").await;

        assert!(!result.heartbeat_stopped);
        assert_eq!(result.connections_closed, 0);
    }

    #[tokio::test]
    async fn test_shutdown_closes_streams() {
        let fanout = Arc::new(FanoutService::new(StreamConfig::default()));
        fanout.start();

        let (sink, mut rx) = ChannelSink::channel(4);
        fanout.register("u1", Arc::new(sink));

        let result = GracefulShutdown::new(fanout.clone()).execute("test shutdown").await;

        assert!(result.heartbeat_stopped);
        assert_eq!(result.connections_closed, 1);
        assert!(rx.recv().await.is_none());
        assert!(fanout.registry().is_empty());
    }
}
