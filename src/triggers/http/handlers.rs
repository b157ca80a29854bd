//! HTTP notification handlers

use axum::{extract::State, Json};
use chrono::Utc;

use crate::error::Result;
use crate::server::AppState;
use crate::sse::DEFAULT_EVENT;

use super::models::{BroadcastRequest, BroadcastResponse, NotifyRequest, NotifyResponse};

/// Send an event to every connection of one identity
#[tracing::instrument(
    name = "http.notify_identity",
    skip(state, request),
    fields(identity = %request.identity)
)]
pub async fn notify_identity(
    State(state): State<AppState>,
    Json(request): Json<NotifyRequest>,
) -> Result<Json<NotifyResponse>> {
    request.validate()?;

    let delivered_to = state
        .fanout
        .notify(&request.identity, request.event.as_deref())
        .await;

    Ok(Json(NotifyResponse {
        event: request.event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        identity: request.identity,
        delivered_to,
        timestamp: Utc::now(),
    }))
}

/// Send an event to every registered connection
#[tracing::instrument(name = "http.broadcast", skip(state, request))]
pub async fn broadcast_event(
    State(state): State<AppState>,
    request: Option<Json<BroadcastRequest>>,
) -> Result<Json<BroadcastResponse>> {
    let request = request.map(|Json(r)| r).unwrap_or_default();
    request.validate()?;

    let outcome = state.fanout.broadcast(request.event.as_deref()).await;

    Ok(Json(BroadcastResponse {
        event: request.event.unwrap_or_else(|| DEFAULT_EVENT.to_string()),
        success_count: outcome.success_count,
        failure_count: outcome.failure_count,
        timestamp: Utc::now(),
    }))
}
