//! Connection inspection endpoints.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityConnectionsResponse {
    pub identity: String,
    pub connection_count: usize,
}

/// GET /api/v1/connections/{identity} - live connection count for one identity
pub async fn identity_connections(
    State(state): State<AppState>,
    Path(identity): Path<String>,
) -> Json<IdentityConnectionsResponse> {
    let connection_count = state.fanout.registry().connection_count_for(&identity);

    Json(IdentityConnectionsResponse {
        identity,
        connection_count,
    })
}
