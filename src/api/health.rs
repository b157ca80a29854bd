use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::notification::DispatcherStatsSnapshot;
use crate::registry::ConnectionStats;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: ConnectionStats,
    pub notifications: DispatcherStatsSnapshot,
    pub maintenance_running: bool,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(StatsResponse {
        connections: state.fanout.stats(),
        notifications: state.fanout.dispatcher_stats(),
        maintenance_running: state.fanout.is_running(),
    })
}
