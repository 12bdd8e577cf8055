//! Aggregate views computed by the store

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FaultRecord, LogRecord, RequestRecord, SqlQueryRecord};

/// Counts, means and histograms across all collections
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub total_requests: usize,
    pub total_queries: usize,
    pub total_logs: usize,
    pub total_faults: usize,
    pub average_response_time: f64,
    pub average_query_time: f64,
    pub status_codes: BTreeMap<u16, usize>,
    pub methods: BTreeMap<String, usize>,
    pub fault_types: BTreeMap<String, usize>,
    pub log_levels: BTreeMap<String, usize>,
    pub slowest_requests: Vec<SlowRequest>,
    pub slowest_queries: Vec<SlowQuery>,
    pub database_size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowRequest {
    pub id: String,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub execution_time_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl From<&RequestRecord> for SlowRequest {
    fn from(r: &RequestRecord) -> Self {
        Self {
            id: r.envelope.id().to_string(),
            method: r.method.clone(),
            path: r.path.clone(),
            status_code: r.status_code,
            execution_time_ms: r.execution_time_ms,
            timestamp: r.envelope.timestamp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowQuery {
    pub id: String,
    /// Command text, possibly truncated
    pub query: String,
    pub execution_time_ms: u64,
    pub is_successful: bool,
    pub timestamp: DateTime<Utc>,
}

/// Request timing over a recent window
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub window_minutes: i64,
    pub total_requests: usize,
    pub average_response_time: f64,
    pub median_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
    /// Percentage of requests with status >= 400
    pub error_rate: f64,
    pub requests_per_minute: f64,
    pub slowest_endpoints: Vec<EndpointPerformance>,
    pub status_code_distribution: Vec<StatusCodeDistribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointPerformance {
    /// `METHOD path`
    pub endpoint: String,
    pub average_response_time: f64,
    pub request_count: usize,
    pub error_rate: f64,
    pub p95_response_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCodeDistribution {
    pub status_code: u16,
    pub count: usize,
    pub percentage: f64,
}

/// Storage health for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreHealth {
    /// `healthy`, or `degraded` once the database passes the large-size mark
    pub status: String,
    pub durable: bool,
    pub database_size: u64,
    pub total_entries: usize,
    pub requests: usize,
    pub queries: usize,
    pub logs: usize,
    pub faults: usize,
    pub checked_at: DateTime<Utc>,
}

/// Full dump of every collection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportData {
    pub exported_at: Option<DateTime<Utc>>,
    pub requests: Vec<RequestRecord>,
    pub queries: Vec<SqlQueryRecord>,
    pub logs: Vec<LogRecord>,
    pub faults: Vec<FaultRecord>,
}
