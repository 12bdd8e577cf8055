//! reqtrace demo server - Binary Entry Point
//!
//! Serves a handful of sample routes behind the capture middleware, with
//! the dashboard API mounted under the configured base path.
//!
//! Usage: `reqtrace-server [config.toml]`. The config path may also come
//! from `REQTRACE_CONFIG`, the listen address from `REQTRACE_LISTEN`.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use serde_json::json;
use tower_http::catch_panic::CatchPanicLayer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reqtrace::capture::capture_requests;
use reqtrace::correlation::Command;
use reqtrace::{
    create_router, Capture, CaptureConfig, ReportedFault, RequestId, RetentionScheduler,
    TelemetryStore,
};

const DEFAULT_LISTEN: &str = "127.0.0.1:5080";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("REQTRACE_CONFIG").ok())
        .map(PathBuf::from);
    let config = CaptureConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config);

    let store = Arc::new(TelemetryStore::from_config(&config).context("opening telemetry store")?);
    let retention = RetentionScheduler::new(Arc::clone(&store), &config).spawn();
    let base_path = config.base_path.clone();
    let capture = Capture::new(config, Arc::clone(&store));

    let app = demo_routes(capture.clone())
        .layer(middleware::from_fn_with_state(capture.clone(), capture_requests))
        .layer(CatchPanicLayer::new())
        .merge(create_router(capture));

    let listen = std::env::var("REQTRACE_LISTEN").unwrap_or_else(|_| DEFAULT_LISTEN.to_string());
    let listener = tokio::net::TcpListener::bind(&listen)
        .await
        .with_context(|| format!("binding {listen}"))?;
    info!("Listening on http://{}", listener.local_addr()?);
    info!("Dashboard API at http://{}{}/api", listener.local_addr()?, base_path);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("serving")?;

    info!("Shutting down");
    retention.shutdown().await;
    store.close().context("closing telemetry store")?;
    Ok(())
}

/// Initialize logging
fn init_logging(config: &CaptureConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},reqtrace=debug", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
    }
}

fn demo_routes(capture: Capture) -> Router {
    Router::new()
        .route("/", get(|| async { "reqtrace demo" }))
        .route("/users/:id", get(get_user))
        .route("/echo", post(echo))
        .route("/slow", get(slow))
        .route("/fail", get(fail))
        .route("/panic", get(boom))
        .with_state(capture)
}

/// Runs a pretend query and logs around it
async fn get_user(
    State(capture): State<Capture>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<u64>,
) -> Json<serde_json::Value> {
    let request_id = Some(request_id.as_str());
    capture.logger().info(format!("Loading user {id}"), request_id);

    let mut command = Command::new("SELECT id, name FROM users WHERE id = @id")
        .with_parameter("@id", json!(id))
        .with_database("demo");
    capture.interceptor().executing(&mut command, request_id);
    capture.interceptor().executed(&mut command, 1);

    let mut properties = BTreeMap::new();
    properties.insert("user_id".to_string(), json!(id));
    capture
        .logger()
        .log("Success", "User loaded", Some("users"), properties, request_id);

    Json(json!({ "id": id, "name": format!("user-{id}") }))
}

async fn echo(body: String) -> String {
    body
}

async fn slow() -> &'static str {
    tokio::time::sleep(std::time::Duration::from_millis(750)).await;
    "done"
}

/// Error response carrying a reported fault
async fn fail() -> Response {
    let err = std::io::Error::new(std::io::ErrorKind::NotFound, "inventory file missing");
    let mut response = (StatusCode::INTERNAL_SERVER_ERROR, "inventory unavailable").into_response();
    response
        .extensions_mut()
        .insert(ReportedFault::from_error(&err).with_data("component", "inventory"));
    response
}

async fn boom() -> &'static str {
    panic!("demo panic")
}
