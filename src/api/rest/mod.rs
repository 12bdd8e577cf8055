//! Dashboard REST endpoints
//!
//! - `GET {base}/api/requests`, `/queries`, `/logs`, `/exceptions` - filtered pages
//! - `GET {base}/api/<kind>/:id` - single record
//! - `GET {base}/api/stats`, `/performance`, `/config`, `/export`
//! - `GET {base}/api/search?term=&types=` - free text across kinds
//! - `GET {base}/api/health` - store size, counts and durability
//! - `POST {base}/api/logs` - record a log statement
//! - `DELETE {base}/api/<kind>` - delete the listed ids
//! - `DELETE {base}/api/clear` - drop everything

pub mod records;
pub mod search;
pub mod summary;

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use tracing::error;

use crate::capture::Capture;
use crate::error::StoreError;

/// Standard API response wrapper
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub data: T,
    /// Latest notification sequence id, for gap detection against the socket
    pub sequence_id: u64,
}

impl<T> ApiResponse<T> {
    pub fn new(data: T, sequence_id: u64) -> Self {
        Self { data, sequence_id }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "BAD_REQUEST".to_string(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "NOT_FOUND".to_string(),
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "UNAVAILABLE".to_string(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: "INTERNAL_ERROR".to_string(),
        }
    }
}

pub(crate) fn sequence_id(capture: &Capture) -> u64 {
    capture
        .broadcaster()
        .map_or(0, |b| b.current_sequence_id())
}

pub(crate) fn ok<T: Serialize>(capture: &Capture, data: T) -> Response {
    (StatusCode::OK, Json(ApiResponse::new(data, sequence_id(capture)))).into_response()
}

pub(crate) fn created<T: Serialize>(capture: &Capture, data: T) -> Response {
    (
        StatusCode::CREATED,
        Json(ApiResponse::new(data, sequence_id(capture))),
    )
        .into_response()
}

pub(crate) fn bad_request(message: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ApiError::bad_request(message))).into_response()
}

pub(crate) fn store_error(e: StoreError) -> Response {
    match e {
        StoreError::Closed => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError::unavailable("telemetry store is closed")),
        )
            .into_response(),
        other => {
            error!(error = %other, "Dashboard query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError::internal(other.to_string())),
            )
                .into_response()
        }
    }
}
