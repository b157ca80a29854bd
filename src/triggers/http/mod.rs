//! HTTP notification trigger handlers
//!
//! Other parts of the dashboard (certificate, user and feedback routes) call
//! these after a domain change so open tabs re-fetch:
//! - Single identity notifications
//! - Broadcast notifications

mod handlers;
mod models;

pub use handlers::{broadcast_event, notify_identity};
pub use models::{BroadcastRequest, BroadcastResponse, NotifyRequest, NotifyResponse};
