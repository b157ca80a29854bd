// Shared components
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

// Connection registry and delivery
pub mod fanout;
pub mod notification;
pub mod registry;

// Application layer
pub mod api;
pub mod server;
pub mod sse;
pub mod triggers;

// Supporting modules
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
