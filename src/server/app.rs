use axum::{extract::DefaultBodyLimit, http::HeaderValue, middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::{api_routes, public_routes};
use crate::sse::sse_handler;

use super::{api_key_auth, AppState};

const MAX_TRIGGER_BODY_BYTES: usize = 16 * 1024;

pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.server.cors_origins);

    let protected = api_routes()
        .layer(middleware::from_fn_with_state(state.clone(), api_key_auth))
        // Trigger payloads are an identity and an event name
        .layer(DefaultBodyLimit::max(MAX_TRIGGER_BODY_BYTES));

    Router::new()
        // Event stream endpoint
        .route("/events", get(sse_handler))
        .merge(public_routes())
        .nest("/api/v1", protected)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}
