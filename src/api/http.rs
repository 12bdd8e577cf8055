//! Dashboard router

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::rest::{records, search, summary};
use super::websocket::ws_handler;
use crate::capture::Capture;

/// Dashboard API and socket under the configured base path.
///
/// Nothing is mounted when capture is disabled, so every dashboard path
/// answers 404.
pub fn create_router(capture: Capture) -> Router {
    if !capture.config().enabled {
        return Router::new();
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let dashboard = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route(
            "/api/requests",
            get(records::list_requests).delete(records::delete_requests),
        )
        .route("/api/requests/:id", get(records::get_request))
        .route(
            "/api/queries",
            get(records::list_queries).delete(records::delete_queries),
        )
        .route("/api/queries/:id", get(records::get_query))
        .route(
            "/api/logs",
            get(records::list_logs)
                .post(records::create_log)
                .delete(records::delete_logs),
        )
        .route("/api/logs/:id", get(records::get_log))
        .route(
            "/api/exceptions",
            get(records::list_faults).delete(records::delete_faults),
        )
        .route("/api/exceptions/:id", get(records::get_fault))
        .route("/api/search", get(search::search))
        .route("/api/health", get(summary::get_health))
        .route("/api/stats", get(summary::get_stats))
        .route("/api/performance", get(summary::get_performance))
        .route("/api/config", get(summary::get_config))
        .route("/api/export", get(summary::export))
        .route("/api/clear", delete(summary::clear))
        .layer(cors);

    let base_path = capture.config().base_path.trim_end_matches('/').to_string();
    Router::new()
        .nest(&base_path, dashboard)
        .with_state(capture)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
