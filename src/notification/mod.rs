//! Event fan-out to registered connections.

mod dispatcher;
mod types;

pub use dispatcher::{DispatcherStats, DispatcherStatsSnapshot, NotificationDispatcher};
pub use types::{BroadcastOutcome, NotificationTarget};
