//! Connection handle and the sink abstraction it writes through

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::sse::SseFrame;

/// Identifier handed out by the registry when a connection is registered
pub type ConnectionId = Uuid;

/// Result of one write attempt against one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Delivered,
    Disconnected,
}

impl WriteOutcome {
    pub fn is_delivered(self) -> bool {
        matches!(self, Self::Delivered)
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("connection closed")]
    Closed,
    #[error("write timed out after {0:?}")]
    Timeout(Duration),
}

/// Writable end of a streaming transport.
///
/// Implementations must be safe to call concurrently; `close` on an already
/// closed sink returns [`SinkError::Closed`].
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn write(&self, frame: SseFrame) -> Result<(), SinkError>;

    fn close(&self) -> Result<(), SinkError>;

    /// Whether a successful `write` means the frame reached the transport.
    ///
    /// Buffering sinks return `false`; whoever drains the buffer then
    /// refreshes the connection's activity instead.
    fn confirms_delivery(&self) -> bool {
        true
    }
}

/// Sink backed by a bounded channel whose receiver feeds the HTTP response body.
///
/// Closing drops the sender, which ends the response stream.
pub struct ChannelSink {
    sender: Mutex<Option<mpsc::Sender<SseFrame>>>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SseFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                sender: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    fn sender(&self) -> Option<mpsc::Sender<SseFrame>> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn write(&self, frame: SseFrame) -> Result<(), SinkError> {
        let sender = self.sender().ok_or(SinkError::Closed)?;
        sender.send(frame).await.map_err(|_| SinkError::Closed)
    }

    fn close(&self) -> Result<(), SinkError> {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .map(drop)
            .ok_or(SinkError::Closed)
    }

    // A send only queues the frame; the response stream touches on drain
    fn confirms_delivery(&self) -> bool {
        false
    }
}

/// Handle for a single registered event-stream connection
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub identity: String,
    pub connected_at: DateTime<Utc>,
    sink: Arc<dyn EventSink>,
    /// Last successful write (Unix millis) - AtomicI64 for lock-free updates
    last_activity: AtomicI64,
}

impl ConnectionHandle {
    pub fn new(identity: String, sink: Arc<dyn EventSink>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            identity,
            connected_at: now,
            sink,
            last_activity: AtomicI64::new(now.timestamp_millis()),
        }
    }

    pub fn touch(&self) {
        self.last_activity
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity.load(Ordering::Relaxed))
            .unwrap_or(self.connected_at)
    }

    /// True when the last successful write is strictly older than `now - threshold`
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        let idle_ms = now.timestamp_millis() - self.last_activity.load(Ordering::Relaxed);
        idle_ms > i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX)
    }

    /// Write one frame, bounded by `timeout`.
    ///
    /// Success refreshes the activity timestamp only when the sink confirms
    /// delivery; a queued frame is not proof the client is still reading.
    pub async fn write(&self, frame: SseFrame, timeout: Duration) -> WriteOutcome {
        let result = match tokio::time::timeout(timeout, self.sink.write(frame)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(timeout)),
        };

        match result {
            Ok(()) => {
                if self.sink.confirms_delivery() {
                    self.touch();
                }
                WriteOutcome::Delivered
            }
            Err(e) => {
                tracing::debug!(
                    connection_id = %self.id,
                    identity = %self.identity,
                    error = %e,
                    "Write failed, connection treated as disconnected"
                );
                WriteOutcome::Disconnected
            }
        }
    }

    pub fn close(&self) -> Result<(), SinkError> {
        self.sink.close()
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("connected_at", &self.connected_at)
            .field("last_activity", &self.last_activity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_frames() {
        let (sink, mut rx) = ChannelSink::channel(4);
        sink.write(SseFrame::event(Some("birth.verified"))).await.unwrap();

        let frame = rx.recv().await.unwrap();
        assert_eq!(frame, SseFrame::event(Some("birth.verified")));
    }

    #[tokio::test]
    async fn test_channel_sink_close_ends_stream() {
        let (sink, mut rx) = ChannelSink::channel(4);
        assert!(sink.close().is_ok());
        assert!(matches!(sink.close(), Err(SinkError::Closed)));
        assert!(rx.recv().await.is_none());
        assert!(matches!(
            sink.write(SseFrame::KeepAlive).await,
            Err(SinkError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_write_fails_when_receiver_dropped() {
        let (sink, rx) = ChannelSink::channel(4);
        let handle = ConnectionHandle::new("u1".to_string(), Arc::new(sink));
        drop(rx);

        let outcome = handle.write(SseFrame::KeepAlive, Duration::from_millis(100)).await;
        assert_eq!(outcome, WriteOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_write_times_out_on_full_channel() {
        let (sink, _rx) = ChannelSink::channel(1);
        let handle = ConnectionHandle::new("u1".to_string(), Arc::new(sink));

        let first = handle.write(SseFrame::KeepAlive, Duration::from_millis(50)).await;
        assert!(first.is_delivered());

        // Nobody drains the receiver, so the second write blocks until the timeout
        let second = handle.write(SseFrame::KeepAlive, Duration::from_millis(50)).await;
        assert_eq!(second, WriteOutcome::Disconnected);
    }

    #[tokio::test]
    async fn test_queued_frames_do_not_refresh_activity() {
        // Reader stopped: frames pile up in the buffer and nobody drains them
        let (sink, _rx) = ChannelSink::channel(32);
        let handle = ConnectionHandle::new("u1".to_string(), Arc::new(sink));
        let registered = handle.last_activity();

        tokio::time::sleep(Duration::from_millis(5)).await;
        for _ in 0..32 {
            let outcome = handle.write(SseFrame::KeepAlive, Duration::from_millis(50)).await;
            assert!(outcome.is_delivered());
        }

        assert_eq!(handle.last_activity(), registered);
        assert!(handle.is_stale(registered + chrono::Duration::seconds(61), Duration::from_secs(60)));
    }

    #[test]
    fn test_staleness_threshold_is_strict() {
        let (sink, _rx) = ChannelSink::channel(1);
        let handle = ConnectionHandle::new("u1".to_string(), Arc::new(sink));
        let last = handle.last_activity();
        let threshold = Duration::from_secs(60);

        assert!(!handle.is_stale(last + chrono::Duration::seconds(60), threshold));
        assert!(handle.is_stale(
            last + chrono::Duration::seconds(60) + chrono::Duration::milliseconds(1),
            threshold
        ));
    }
}
