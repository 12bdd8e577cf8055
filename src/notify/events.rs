//! Dashboard event types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::stats::QUERY_PREVIEW_CHARS;
use crate::types::{FaultRecord, LogRecord, RequestRecord, SqlQueryRecord, StatsSnapshot};

/// Events pushed to dashboard clients. Each carries a compact summary,
/// never the full record.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    NewRequest {
        id: String,
        method: String,
        path: String,
        status_code: u16,
        execution_time_ms: u64,
        timestamp: DateTime<Utc>,
    },

    NewQuery {
        id: String,
        #[serde(skip_serializing_if = "String::is_empty", default)]
        request_id: String,
        query: String,
        execution_time_ms: u64,
        is_successful: bool,
    },

    NewLog {
        id: String,
        level: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },

    NewFault {
        id: String,
        fault_type: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
    },

    StatsUpdated {
        total_requests: usize,
        total_queries: usize,
        total_logs: usize,
        total_faults: usize,
    },

    DataCleared,
}

impl DashboardEvent {
    pub fn new_request(r: &RequestRecord) -> Self {
        Self::NewRequest {
            id: r.envelope.id().to_string(),
            method: r.method.clone(),
            path: r.path.clone(),
            status_code: r.status_code,
            execution_time_ms: r.execution_time_ms,
            timestamp: r.envelope.timestamp(),
        }
    }

    pub fn new_query(q: &SqlQueryRecord) -> Self {
        Self::NewQuery {
            id: q.envelope.id().to_string(),
            request_id: q.envelope.request_id.clone(),
            query: q.query.chars().take(QUERY_PREVIEW_CHARS).collect(),
            execution_time_ms: q.execution_time_ms,
            is_successful: q.is_successful,
        }
    }

    pub fn new_log(l: &LogRecord) -> Self {
        Self::NewLog {
            id: l.envelope.id().to_string(),
            level: l.level.clone(),
            message: l.message.clone(),
            tag: l.tag.clone(),
        }
    }

    pub fn new_fault(f: &FaultRecord) -> Self {
        Self::NewFault {
            id: f.envelope.id().to_string(),
            fault_type: f.fault_type.clone(),
            message: f.message.clone(),
            path: f.path.clone(),
        }
    }

    pub fn stats_updated(stats: &StatsSnapshot) -> Self {
        Self::StatsUpdated {
            total_requests: stats.total_requests,
            total_queries: stats.total_queries,
            total_logs: stats.total_logs,
            total_faults: stats.total_faults,
        }
    }
}

/// Wire wrapper with gap-detection sequence id
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(flatten)]
    pub event: DashboardEvent,

    pub sequence_id: u64,

    /// Unix seconds
    pub timestamp: i64,
}

/// Messages accepted from dashboard clients
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
}

/// Sent once when a client connects
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WelcomeMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub current_sequence_id: u64,
}

impl WelcomeMessage {
    pub fn new(current_sequence_id: u64) -> Self {
        Self {
            msg_type: "connected".to_string(),
            current_sequence_id,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PongMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
}

impl Default for PongMessage {
    fn default() -> Self {
        Self {
            msg_type: "pong".to_string(),
        }
    }
}
