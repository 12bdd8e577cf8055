//! axum middleware observing each request
//!
//! Per request: Idle -> Started -> (BodyCaptured)? -> Completed | Faulted
//! -> Flushed. Excluded paths and a disabled config skip straight to the
//! inner service.

use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::time::Instant;

use axum::extract::{ConnectInfo, MatchedPath, Request, State};
use axum::http::{header, request::Parts, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use futures::FutureExt;
use tracing::debug;

use super::{body, fault, redact_headers, Capture, ReportedFault};
use crate::config::CaptureConfig;
use crate::types::{new_record_id, RequestRecord};

/// Header carrying a caller-chosen correlation identifier
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Status recorded when the client goes away before a response exists
pub const CANCELLED_STATUS: u16 = 499;

/// Correlation identifier of the current request, placed in request
/// extensions for handlers to pass to nested instrumentation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request fields known only once the request has run
#[derive(Debug, Default)]
struct Outcome {
    status: u16,
    request_body: Option<String>,
    request_size: u64,
    response_body: Option<String>,
    response_content_type: Option<String>,
    response_size: u64,
}

/// Flushes the in-flight record exactly once, including when the
/// middleware future is dropped mid-request.
struct FlushGuard {
    capture: Capture,
    request_id: String,
    started: Instant,
    outcome: Outcome,
    flushed: bool,
}

impl FlushGuard {
    fn new(capture: Capture, request_id: String) -> Self {
        Self {
            capture,
            request_id,
            started: Instant::now(),
            outcome: Outcome::default(),
            flushed: false,
        }
    }

    fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;
        let elapsed_ms = self.started.elapsed().as_millis() as u64;

        let Some(mut record) = self.capture.buffer().complete(&self.request_id) else {
            return;
        };
        let config = self.capture.config();
        let outcome = std::mem::take(&mut self.outcome);

        record.status_code = outcome.status;
        record.execution_time_ms = elapsed_ms;
        record.is_slow = elapsed_ms > config.slow_request_threshold_ms;
        record.request_body = outcome.request_body;
        record.request_size = outcome.request_size;
        record.response_body = outcome.response_body;
        record.response_content_type = outcome.response_content_type;
        record.response_size = outcome.response_size;

        if let Some(fault) = record.fault.as_mut() {
            fault.envelope.request_id = self.request_id.clone();
            fault.method = Some(record.method.clone());
            fault.path = Some(record.path.clone());
            fault.route = record
                .envelope
                .metadata
                .get("route")
                .and_then(|v| v.as_str())
                .map(String::from);
            if let Some(trace) = fault.stack_trace.as_mut() {
                *trace = fault::truncate_stack(trace, config.max_stack_trace_depth);
            }
            self.capture.recorder().record_fault(fault.clone());
        }

        debug!(
            request_id = %self.request_id,
            method = %record.method,
            path = %record.path,
            status = record.status_code,
            elapsed_ms,
            "Request captured"
        );
        self.capture.recorder().record_request(record);
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if !self.flushed {
            if self.outcome.status == 0 {
                self.outcome.status = CANCELLED_STATUS;
            }
            self.flush();
        }
    }
}

/// Capture middleware; install with
/// `axum::middleware::from_fn_with_state(capture, capture_requests)`.
///
/// Panics in the inner service are recorded and then resumed, so an
/// outer panic handler still sees them.
pub async fn capture_requests(
    State(capture): State<Capture>,
    request: Request,
    next: Next,
) -> Response {
    let config = capture.config();
    if !config.enabled || capture.is_excluded(request.uri().path()) {
        return next.run(request).await;
    }

    let (mut parts, body) = request.into_parts();
    let mut request_id = incoming_request_id(&parts.headers).unwrap_or_else(new_record_id);
    if !capture.buffer().begin(&request_id, describe(&parts, config)) {
        // Same id already in flight; keep the two apart
        request_id = new_record_id();
        capture.buffer().begin(&request_id, describe(&parts, config));
    }
    parts.extensions.insert(RequestId(request_id.clone()));
    let mut guard = FlushGuard::new(capture.clone(), request_id.clone());

    let declared = content_length(&parts.headers);
    let body = if config.log_request_bodies {
        let (body, captured) = body::tee(body, declared, config.max_body_size).await;
        guard.outcome.request_size = captured.size().or(declared).unwrap_or(0);
        guard.outcome.request_body = Some(captured.into_text());
        body
    } else {
        guard.outcome.request_size = declared.unwrap_or(0);
        body
    };

    let request = Request::from_parts(parts, body);
    let response = match AssertUnwindSafe(next.run(request)).catch_unwind().await {
        Ok(response) => response,
        Err(payload) => {
            guard.outcome.status = 500;
            if config.log_exceptions {
                capture
                    .buffer()
                    .set_fault(&request_id, fault::from_panic(payload.as_ref()));
            }
            guard.flush();
            std::panic::resume_unwind(payload);
        }
    };

    guard.outcome.status = response.status().as_u16();
    if config.log_exceptions {
        if let Some(reported) = response.extensions().get::<ReportedFault>() {
            capture
                .buffer()
                .set_fault(&request_id, reported.clone().into_record());
        }
    }
    guard.outcome.response_content_type = header_str(response.headers(), header::CONTENT_TYPE);

    let declared = content_length(response.headers());
    let response = if config.log_response_bodies {
        let (parts, body) = response.into_parts();
        let (body, captured) = body::tee(body, declared, config.max_body_size).await;
        guard.outcome.response_size = captured.size().or(declared).unwrap_or(0);
        guard.outcome.response_body = Some(captured.into_text());
        Response::from_parts(parts, body)
    } else {
        guard.outcome.response_size = declared.unwrap_or(0);
        response
    };

    guard.flush();
    response
}

fn incoming_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

fn describe(parts: &Parts, config: &CaptureConfig) -> RequestRecord {
    let mut record = RequestRecord::new(parts.method.as_str(), parts.uri.path());
    record.query_string = parts.uri.query().unwrap_or_default().to_string();
    record.headers = redact_headers(&parts.headers, &config.excluded_headers);
    record.content_type = header_str(&parts.headers, header::CONTENT_TYPE);
    record.user_agent = header_str(&parts.headers, header::USER_AGENT);
    record.client_address = Some(
        parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
    );
    record.protocol = Some(format!("{:?}", parts.version));
    record.is_https = parts.uri.scheme_str() == Some("https")
        || header_str(&parts.headers, "x-forwarded-proto")
            .map_or(false, |p| p.eq_ignore_ascii_case("https"));
    if let Some(route) = parts.extensions.get::<MatchedPath>() {
        record
            .envelope
            .metadata
            .insert("route".to_string(), route.as_str().into());
    }
    record
}

fn header_str<K: header::AsHeaderName>(headers: &HeaderMap, name: K) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    header_str(headers, header::CONTENT_LENGTH).and_then(|v| v.trim().parse().ok())
}
