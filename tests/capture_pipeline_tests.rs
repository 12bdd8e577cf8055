//! End-to-end tests for the capture middleware and dashboard API

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body, Bytes};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Router};
use tower::util::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;

use reqtrace::capture::{capture_requests, CANCELLED_STATUS, PANIC_FAULT_TYPE};
use reqtrace::correlation::Command;
use reqtrace::types::{Filter, RecordKind};
use reqtrace::{
    create_router, Capture, CaptureConfig, ReportedFault, RequestId, RequestRecord, TelemetryStore,
};

fn test_config() -> CaptureConfig {
    CaptureConfig {
        log_response_bodies: true,
        ..CaptureConfig::in_memory()
    }
}

fn build_app(config: CaptureConfig) -> (Router, Capture) {
    let capture = Capture::new(config, Arc::new(TelemetryStore::in_memory()));

    let routes = Router::new()
        .route("/hello", get(|| async { "hello" }))
        .route("/echo", post(|body: String| async move { body }))
        .route("/orders", get(orders))
        .route("/fail", get(fail))
        .route("/panic", get(boom))
        .route("/hang", get(hang))
        .route("/health", get(|| async { "OK" }))
        .route("/healthz", get(|| async { "OK" }))
        .with_state(capture.clone());

    let app = routes
        .layer(middleware::from_fn_with_state(capture.clone(), capture_requests))
        .layer(CatchPanicLayer::new())
        .merge(create_router(capture.clone()));
    (app, capture)
}

async fn orders(
    State(capture): State<Capture>,
    request_id: Option<Extension<RequestId>>,
) -> &'static str {
    let request_id = request_id.as_ref().map(|Extension(id)| id.as_str());
    capture.logger().info("listing orders", request_id);

    let mut command = Command::new("SELECT * FROM orders WHERE customer = @c")
        .with_parameter("@c", serde_json::json!(42))
        .with_connection("Server=db;User=app;Password=hunter2");
    capture.interceptor().executing(&mut command, request_id);
    capture.interceptor().executed(&mut command, 3);

    let mut failing = Command::new("DELETE FROM audit");
    capture.interceptor().executing(&mut failing, request_id);
    capture.interceptor().failed(&mut failing, "permission denied");

    "orders"
}

async fn fail() -> Response {
    let err = std::io::Error::new(std::io::ErrorKind::Other, "upstream unavailable");
    let mut response = (StatusCode::BAD_GATEWAY, "try later").into_response();
    response
        .extensions_mut()
        .insert(ReportedFault::from_error(&err).with_data("upstream", "billing"));
    response
}

async fn boom() -> &'static str {
    panic!("handler exploded")
}

async fn hang() -> &'static str {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    "never"
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Bytes) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body)
}

fn get_req(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn only_request(capture: &Capture) -> RequestRecord {
    let page = capture.store().query_requests(&Filter::default()).unwrap();
    assert_eq!(page.total_count, 1, "expected exactly one captured request");
    page.items.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_disabled_capture_is_transparent() {
    let config = CaptureConfig {
        enabled: false,
        ..test_config()
    };
    let (app, capture) = build_app(config);

    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/echo")
            .body(Body::from("unchanged"))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "unchanged");

    let (status, body) = send(&app, get_req("/orders")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "orders");
    assert_eq!(capture.store().count().unwrap(), 0);

    let (status, _) = send(&app, get_req("/_debug/api/requests")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_fields_and_header_redaction() {
    let (app, capture) = build_app(test_config());

    let (status, body) = send(
        &app,
        Request::builder()
            .uri("/hello?lang=en")
            .header("Authorization", "Bearer secret-token")
            .header("Cookie", "session=abc")
            .header("User-Agent", "pipeline-test")
            .header("X-Trace", "t-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "hello");

    let record = only_request(&capture);
    assert_eq!(record.method, "GET");
    assert_eq!(record.path, "/hello");
    assert_eq!(record.query_string, "lang=en");
    assert_eq!(record.status_code, 200);
    assert_eq!(record.user_agent.as_deref(), Some("pipeline-test"));
    assert_eq!(record.client_address.as_deref(), Some("Unknown"));
    assert_eq!(record.headers.get("x-trace").map(String::as_str), Some("t-1"));
    assert!(!record.headers.contains_key("authorization"));
    assert!(!record.headers.contains_key("cookie"));
    assert_eq!(record.response_body.as_deref(), Some("hello"));
    assert_eq!(record.response_size, 5);
    assert_eq!(record.envelope.metadata["route"], "/hello");
    assert!(record.envelope.has_request());
}

#[tokio::test]
async fn test_request_body_is_captured_and_replayed() {
    let (app, capture) = build_app(test_config());
    let payload = r#"{"item":"book","qty":2}"#;

    let (status, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-type", "application/json")
            .body(Body::from(payload))
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, payload);

    let record = only_request(&capture);
    assert_eq!(record.request_body.as_deref(), Some(payload));
    assert_eq!(record.request_size, payload.len() as u64);
    assert_eq!(record.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn test_oversized_body_gets_placeholder_but_reaches_handler() {
    let config = CaptureConfig {
        max_body_size: 8,
        ..test_config()
    };
    let (app, capture) = build_app(config);
    let payload = "0123456789abcdef";

    let (_, body) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/echo")
            .header("content-length", payload.len().to_string())
            .body(Body::from(payload))
            .unwrap(),
    )
    .await;
    assert_eq!(body, payload);

    let record = only_request(&capture);
    let captured = record.request_body.unwrap();
    assert!(captured.starts_with("[Body too large"), "{captured}");
    assert_eq!(record.request_size, 16);
}

#[tokio::test]
async fn test_nested_queries_and_logs_attach_to_request() {
    let (app, capture) = build_app(test_config());

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/orders")
            .header("x-request-id", "req-orders-1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let record = only_request(&capture);
    assert_eq!(record.envelope.request_id, "req-orders-1");
    assert_eq!(record.logs.len(), 1);
    assert_eq!(record.logs[0].message, "listing orders");

    assert_eq!(record.sql_queries.len(), 2);
    let select = record
        .sql_queries
        .iter()
        .find(|q| q.query.starts_with("SELECT"))
        .unwrap();
    assert_eq!(select.query, "SELECT * FROM orders WHERE customer = @c");
    assert!(select.is_successful);
    assert_eq!(select.rows_affected, 3);
    assert_eq!(select.parameters["@c"], 42);
    assert!(!select.connection.as_deref().unwrap().contains("hunter2"));

    let delete = record
        .sql_queries
        .iter()
        .find(|q| q.query == "DELETE FROM audit")
        .unwrap();
    assert!(!delete.is_successful);
    assert_eq!(delete.error.as_deref(), Some("permission denied"));

    let mut filter = Filter::default();
    filter.request_id = Some("req-orders-1".to_string());
    assert_eq!(capture.store().query_queries(&filter).unwrap().total_count, 2);
    assert_eq!(capture.store().query_logs(&filter).unwrap().total_count, 1);
    assert!(capture.buffer().is_empty());
}

#[tokio::test]
async fn test_reported_fault_is_recorded_without_changing_response() {
    let (app, capture) = build_app(test_config());

    let (status, body) = send(&app, get_req("/fail")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, "try later");

    let record = only_request(&capture);
    assert_eq!(record.status_code, 502);
    let fault = record.fault.unwrap();
    assert_eq!(fault.message, "upstream unavailable");
    assert_eq!(fault.route.as_deref(), Some("/fail"));
    assert_eq!(fault.data["upstream"], "\"billing\"");

    let faults = capture.store().query_faults(&Filter::default()).unwrap();
    assert_eq!(faults.total_count, 1);
    assert_eq!(faults.items[0].envelope.request_id, record.envelope.request_id);
}

#[tokio::test]
async fn test_panic_is_recorded_and_reraised() {
    let config = CaptureConfig {
        max_stack_trace_depth: 5,
        ..test_config()
    };
    let (app, capture) = build_app(config);

    let (status, _) = send(&app, get_req("/panic")).await;
    // The outer catch-panic layer only sees the panic if it was resumed
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let record = only_request(&capture);
    assert_eq!(record.status_code, 500);
    let fault = record.fault.unwrap();
    assert_eq!(fault.fault_type, PANIC_FAULT_TYPE);
    assert_eq!(fault.message, "handler exploded");
    assert_eq!(fault.method.as_deref(), Some("GET"));
    assert_eq!(fault.path.as_deref(), Some("/panic"));
    let trace = fault.stack_trace.expect("panic faults carry a backtrace");
    assert!(trace.lines().count() <= 6, "{trace}");
    assert_eq!(capture.store().count_of(RecordKind::Fault).unwrap(), 1);
}

#[tokio::test]
async fn test_cancelled_request_is_still_flushed() {
    let (app, capture) = build_app(test_config());

    let pending = app.clone().oneshot(get_req("/hang"));
    assert!(tokio::time::timeout(Duration::from_millis(50), pending)
        .await
        .is_err());

    let record = only_request(&capture);
    assert_eq!(record.status_code, CANCELLED_STATUS);
    assert!(record.execution_time_ms >= 40);
    assert!(capture.buffer().is_empty());
}

#[tokio::test]
async fn test_excluded_paths_are_not_captured() {
    let config = CaptureConfig {
        excluded_paths: vec!["/health".to_string()],
        ..test_config()
    };
    let (app, capture) = build_app(config);

    send(&app, get_req("/health")).await;
    send(&app, get_req("/HEALTH/live")).await;
    send(&app, get_req("/assets/app.js")).await;
    send(&app, get_req("/_debug/api/stats")).await;
    assert_eq!(capture.store().count_of(RecordKind::Request).unwrap(), 0);

    // Prefix match is segment-aware
    send(&app, get_req("/healthz")).await;
    assert_eq!(capture.store().count_of(RecordKind::Request).unwrap(), 1);
}

#[tokio::test]
async fn test_dashboard_lists_captured_requests() {
    let (app, _capture) = build_app(test_config());
    send(&app, get_req("/hello")).await;
    send(&app, get_req("/fail")).await;

    let (status, body) = send(&app, get_req("/_debug/api/requests?statusCode=502")).await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["totalCount"], 1);
    assert_eq!(json["data"]["items"][0]["path"], "/fail");

    let (_, body) = send(&app, get_req("/_debug/api/stats")).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["data"]["totalRequests"], 2);
    assert_eq!(json["data"]["totalFaults"], 1);
}
