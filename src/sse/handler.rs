//! SSE handler implementation.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::auth::extract_token;
use crate::error::AppError;
use crate::fanout::FanoutService;
use crate::registry::{ChannelSink, ConnectionHandle, ConnectionId};
use crate::server::AppState;

use super::SseFrame;

/// Query parameters for SSE endpoint
#[derive(Debug, Deserialize)]
pub struct SseQuery {
    pub token: Option<String>,
}

/// Open an event stream for the authenticated identity
#[tracing::instrument(
    name = "sse.connect",
    skip(state, query, headers),
    fields(has_query_token = query.token.is_some())
)]
pub async fn sse_handler(
    State(state): State<AppState>,
    Query(query): Query<SseQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(token) = extract_token(query.token.as_deref(), &headers) else {
        return AppError::Auth("Missing authentication token".to_string()).into_response();
    };

    let claims = match state.jwt_validator.validate(&token) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    let identity = claims.identity().to_string();
    let (sink, rx) = ChannelSink::channel(state.settings.stream.channel_capacity);
    let handle = state.fanout.register(identity.clone(), Arc::new(sink));

    tracing::info!(connection_id = %handle.id, identity = %identity, "SSE connection established");

    let stream = create_sse_stream(rx, handle, state.fanout.clone());
    event_stream_response(Body::from_stream(stream))
}

/// Wrap a body in the headers an event stream needs
pub fn event_stream_response(body: Body) -> Response {
    let mut response = (StatusCode::OK, body).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    // Stop reverse proxies from buffering the stream
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    response
}

/// Create the SSE byte stream.
///
/// `data: connected` is always the first frame. The body is only polled
/// while the transport takes data, so pulling a frame off the channel is
/// what refreshes the connection's activity. The cleanup guard lives inside
/// the stream, so when the client goes away and the body is dropped the
/// connection is unregistered on the spot.
pub(crate) fn create_sse_stream(
    rx: mpsc::Receiver<SseFrame>,
    connection: Arc<ConnectionHandle>,
    fanout: Arc<FanoutService>,
) -> impl Stream<Item = Result<Bytes, Infallible>> {
    let cleanup_guard = CleanupGuard {
        connection_id: connection.id,
        fanout,
    };
    let frames = ReceiverStream::new(rx);

    async_stream::stream! {
        let _guard = cleanup_guard;

        yield Ok(SseFrame::Connected.to_bytes());

        let mut frames = frames;
        while let Some(frame) = frames.next().await {
            connection.touch();
            yield Ok(frame.to_bytes());
        }
    }
}

/// Unregisters the connection when the response stream is dropped
struct CleanupGuard {
    connection_id: ConnectionId,
    fanout: Arc<FanoutService>,
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        if self.fanout.disconnect(self.connection_id) {
            tracing::info!(connection_id = %self.connection_id, "SSE connection closed by client");
        }
    }
}
