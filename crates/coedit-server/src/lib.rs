//! Coedit server library - WebSocket transport for collaborative editing
//! sessions.
//!
//! The router construction lives here (rather than in main.rs) so
//! integration tests can serve the exact same app in-process.

pub mod config;
pub mod logging;
pub mod routes;
pub mod state;
pub mod websocket;

use axum::{routing::get, Router};
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Builds the full application router.
pub fn router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new().route("/health", get(routes::health));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(routes::ws::upgrade))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
