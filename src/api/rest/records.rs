//! Record list and detail endpoints

use std::collections::BTreeMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;

use super::{bad_request, created, ok, store_error, ApiError};
use crate::capture::Capture;
use crate::types::{level, Filter, Record, RecordKind};

fn list(capture: &Capture, kind: RecordKind, filter: &Filter) -> Response {
    match capture.store().query(kind, filter) {
        Ok(page) => ok(capture, page.map(record_json)),
        Err(e) => store_error(e),
    }
}

fn detail(capture: &Capture, kind: RecordKind, id: &str) -> Response {
    let id = urlencoding::decode(id)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| id.to_string());

    match capture.store().get(kind, &id) {
        Ok(Some(record)) => ok(capture, record_json(record)),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ApiError::not_found(format!("{kind} '{id}' not found"))),
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}

fn delete_listed(capture: &Capture, kind: RecordKind, body: Option<Json<DeleteIds>>) -> Response {
    let ids = match body {
        Some(Json(body)) if !body.ids.is_empty() => body.ids,
        _ => return bad_request("a non-empty 'ids' list is required"),
    };
    match capture.store().delete_ids(kind, &ids) {
        Ok(deleted) => ok(capture, serde_json::json!({ "deleted": deleted })),
        Err(e) => store_error(e),
    }
}

/// Body of `DELETE /api/<kind>`
#[derive(Debug, Deserialize)]
pub struct DeleteIds {
    pub ids: Vec<String>,
}

/// Body of `POST /api/logs`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLog {
    pub message: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Drop the kind tag; each endpoint already implies it
fn record_json(record: Record) -> serde_json::Value {
    let value = match record {
        Record::Request(r) => serde_json::to_value(r),
        Record::Query(r) => serde_json::to_value(r),
        Record::Log(r) => serde_json::to_value(r),
        Record::Fault(r) => serde_json::to_value(r),
    };
    value.unwrap_or(serde_json::Value::Null)
}

/// GET /api/requests
pub async fn list_requests(State(capture): State<Capture>, Query(filter): Query<Filter>) -> Response {
    list(&capture, RecordKind::Request, &filter)
}

/// GET /api/requests/:id
pub async fn get_request(State(capture): State<Capture>, Path(id): Path<String>) -> Response {
    detail(&capture, RecordKind::Request, &id)
}

/// GET /api/queries
pub async fn list_queries(State(capture): State<Capture>, Query(filter): Query<Filter>) -> Response {
    list(&capture, RecordKind::Query, &filter)
}

/// GET /api/queries/:id
pub async fn get_query(State(capture): State<Capture>, Path(id): Path<String>) -> Response {
    detail(&capture, RecordKind::Query, &id)
}

/// GET /api/logs
pub async fn list_logs(State(capture): State<Capture>, Query(filter): Query<Filter>) -> Response {
    list(&capture, RecordKind::Log, &filter)
}

/// POST /api/logs
pub async fn create_log(State(capture): State<Capture>, body: Option<Json<CreateLog>>) -> Response {
    let Some(Json(body)) = body else {
        return bad_request("a JSON body with a 'message' is required");
    };
    if body.message.trim().is_empty() {
        return bad_request("'message' must not be empty");
    }
    let level = body
        .level
        .as_deref()
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(level::INFO);
    let record = capture.logger().log(
        level,
        body.message,
        body.tag.as_deref(),
        body.properties,
        body.request_id.as_deref(),
    );
    created(&capture, record)
}

/// GET /api/logs/:id
pub async fn get_log(State(capture): State<Capture>, Path(id): Path<String>) -> Response {
    detail(&capture, RecordKind::Log, &id)
}

/// GET /api/exceptions
pub async fn list_faults(State(capture): State<Capture>, Query(filter): Query<Filter>) -> Response {
    list(&capture, RecordKind::Fault, &filter)
}

/// GET /api/exceptions/:id
pub async fn get_fault(State(capture): State<Capture>, Path(id): Path<String>) -> Response {
    detail(&capture, RecordKind::Fault, &id)
}

/// DELETE /api/requests
pub async fn delete_requests(
    State(capture): State<Capture>,
    body: Option<Json<DeleteIds>>,
) -> Response {
    delete_listed(&capture, RecordKind::Request, body)
}

/// DELETE /api/queries
pub async fn delete_queries(
    State(capture): State<Capture>,
    body: Option<Json<DeleteIds>>,
) -> Response {
    delete_listed(&capture, RecordKind::Query, body)
}

/// DELETE /api/logs
pub async fn delete_logs(State(capture): State<Capture>, body: Option<Json<DeleteIds>>) -> Response {
    delete_listed(&capture, RecordKind::Log, body)
}

/// DELETE /api/exceptions
pub async fn delete_faults(
    State(capture): State<Capture>,
    body: Option<Json<DeleteIds>>,
) -> Response {
    delete_listed(&capture, RecordKind::Fault, body)
}
