//! HTTP surface of the bridge.

pub mod error;
pub mod handlers;
pub mod types;

use axum::Router;
use axum::http::Request;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use kumabridge_core::Bridge;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub bridge: Bridge,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/emit", post(handlers::emit))
        .route("/monitors", post(handlers::monitors))
        .route("/groups", post(handlers::groups))
        .route("/health", get(handlers::health))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}
