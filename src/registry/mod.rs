//! Registry of open event-stream connections
//!
//! This module provides:
//! - Connection handles with activity tracking
//! - The identity index used for targeted delivery
//! - Stale-connection reclamation
//! - Connection statistics

mod connection;
mod manager;
mod stats;

pub use connection::{
    ChannelSink, ConnectionHandle, ConnectionId, EventSink, SinkError, WriteOutcome,
};
pub use manager::{ConnectionRegistry, RemovalReason};
pub use stats::ConnectionStats;
