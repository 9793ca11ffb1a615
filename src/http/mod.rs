//! HTTP front door.
//!
//! Exposes liveness and status endpoints, a small REST surface over the
//! bridge's `tools/list` and `tools/call`, and a raw JSON-RPC passthrough.
//! Every response carries permissive CORS headers.

pub mod errors;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

pub use errors::ApiError;
pub use state::AppState;

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::health).fallback(routes::not_found))
        .route("/health", get(routes::health).fallback(routes::not_found))
        .route("/healthz", get(routes::health).fallback(routes::not_found))
        .route("/status", get(routes::status).fallback(routes::not_found))
        .route("/api", get(routes::api_index).fallback(routes::not_found))
        .route("/api/tools", get(routes::list_tools).fallback(routes::not_found))
        .route("/api/call", post(routes::call_tool).fallback(routes::not_found))
        .route("/mcp", post(routes::json_rpc).fallback(routes::not_found))
        .fallback(routes::not_found)
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(routes::preflight))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            routes::track_requests,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CatchPanicLayer::custom(routes::handle_panic))
        .with_state(state)
}
