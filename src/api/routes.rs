use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;
use crate::triggers::{broadcast_event, notify_identity};

use super::{health, identity_connections, prometheus_metrics, stats};

/// Unauthenticated operational endpoints
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/metrics", get(prometheus_metrics))
}

/// Trigger and inspection endpoints, mounted under `/api/v1`
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Point-to-point
        .route("/notifications/notify", post(notify_identity))
        // Broadcast
        .route("/notifications/broadcast", post(broadcast_event))
        .route("/connections/{identity}", get(identity_connections))
}
