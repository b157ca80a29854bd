//! Server-Sent Events endpoint for dashboard notifications.
//!
//! # Endpoint
//!
//! `GET /events?token=<JWT_TOKEN>`
//!
//! Or with Authorization header:
//! `GET /events` with `Authorization: Bearer <JWT_TOKEN>`
//!
//! # Framing
//!
//! - `data: connected` - sent once, right after registration
//! - `data: <event>` - a notification event; the client re-fetches on receipt
//! - `:keep-alive` - comment line written on the keep-alive interval

mod frame;
mod handler;

pub use frame::{SseFrame, CONNECTED_EVENT, DEFAULT_EVENT};
pub use handler::{sse_handler, SseQuery};
