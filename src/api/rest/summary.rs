//! Aggregate, configuration and maintenance endpoints

use axum::{
    extract::{Query, State},
    response::Response,
};
use chrono::Duration;
use serde::Deserialize;

use super::{ok, store_error};
use crate::capture::Capture;

/// GET /api/stats
pub async fn get_stats(State(capture): State<Capture>) -> Response {
    match capture.store().stats() {
        Ok(stats) => ok(&capture, stats),
        Err(e) => store_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct PerformanceParams {
    /// Window length in minutes (default: 60)
    #[serde(default = "default_window")]
    pub minutes: i64,
}

fn default_window() -> i64 {
    60
}

/// GET /api/health
pub async fn get_health(State(capture): State<Capture>) -> Response {
    match capture.store().health() {
        Ok(health) => ok(&capture, health),
        Err(e) => store_error(e),
    }
}

/// GET /api/performance
pub async fn get_performance(
    State(capture): State<Capture>,
    Query(params): Query<PerformanceParams>,
) -> Response {
    let minutes = params.minutes.clamp(1, 7 * 24 * 60);
    match capture.store().performance(Duration::minutes(minutes)) {
        Ok(metrics) => ok(&capture, metrics),
        Err(e) => store_error(e),
    }
}

/// GET /api/config
pub async fn get_config(State(capture): State<Capture>) -> Response {
    let snapshot = capture.config().snapshot();
    ok(&capture, snapshot)
}

/// GET /api/export
pub async fn export(State(capture): State<Capture>) -> Response {
    match capture.store().export() {
        Ok(data) => ok(&capture, data),
        Err(e) => store_error(e),
    }
}

/// DELETE /api/clear
pub async fn clear(State(capture): State<Capture>) -> Response {
    match capture.recorder().clear_all() {
        Ok(()) => ok(&capture, serde_json::json!({ "cleared": true })),
        Err(e) => store_error(e),
    }
}
