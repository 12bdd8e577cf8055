//! Event model
//!
//! The four captured record kinds and their shared [`Envelope`]. Records
//! are plain data; behaviour lives in the correlation, capture and store
//! modules.

mod envelope;
mod fault;
mod filter;
mod log;
mod query;
mod request;
mod stats;

pub use envelope::{new_record_id, Envelope};
pub use fault::{FaultRecord, MAX_FAULT_DEPTH, SERIALIZATION_ERROR_MARKER};
pub use filter::{Filter, PagedResult, SortField, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use log::{level, LogRecord};
pub use query::{SqlQueryRecord, NULL_PARAMETER};
pub use request::RequestRecord;
pub use stats::{
    EndpointPerformance, ExportData, PerformanceMetrics, SlowQuery, SlowRequest, StatsSnapshot,
    StatusCodeDistribution, StoreHealth,
};

use serde::{Deserialize, Serialize};

/// Discriminant for the four record collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Request,
    Query,
    Log,
    Fault,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Request,
        RecordKind::Query,
        RecordKind::Log,
        RecordKind::Fault,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Request => "request",
            RecordKind::Query => "query",
            RecordKind::Log => "log",
            RecordKind::Fault => "fault",
        }
    }

    /// Singular or plural kind name, case-insensitive; faults also answer
    /// to `exception`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "request" | "requests" => Some(RecordKind::Request),
            "query" | "queries" => Some(RecordKind::Query),
            "log" | "logs" => Some(RecordKind::Log),
            "fault" | "faults" | "exception" | "exceptions" => Some(RecordKind::Fault),
            _ => None,
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored record of any kind, tagged by its [`RecordKind`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "record", rename_all = "snake_case")]
pub enum Record {
    Request(RequestRecord),
    Query(SqlQueryRecord),
    Log(LogRecord),
    Fault(FaultRecord),
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Request(_) => RecordKind::Request,
            Record::Query(_) => RecordKind::Query,
            Record::Log(_) => RecordKind::Log,
            Record::Fault(_) => RecordKind::Fault,
        }
    }

    pub fn envelope(&self) -> &Envelope {
        match self {
            Record::Request(r) => &r.envelope,
            Record::Query(r) => &r.envelope,
            Record::Log(r) => &r.envelope,
            Record::Fault(r) => &r.envelope,
        }
    }

    pub fn id(&self) -> &str {
        self.envelope().id()
    }

    /// Duration in milliseconds for kinds that carry one
    pub fn execution_time_ms(&self) -> Option<u64> {
        match self {
            Record::Request(r) => Some(r.execution_time_ms),
            Record::Query(r) => Some(r.execution_time_ms),
            _ => None,
        }
    }

    pub fn as_request(&self) -> Option<&RequestRecord> {
        match self {
            Record::Request(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_query(&self) -> Option<&SqlQueryRecord> {
        match self {
            Record::Query(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_log(&self) -> Option<&LogRecord> {
        match self {
            Record::Log(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_fault(&self) -> Option<&FaultRecord> {
        match self {
            Record::Fault(r) => Some(r),
            _ => None,
        }
    }
}

impl From<RequestRecord> for Record {
    fn from(r: RequestRecord) -> Self {
        Record::Request(r)
    }
}

impl From<SqlQueryRecord> for Record {
    fn from(r: SqlQueryRecord) -> Self {
        Record::Query(r)
    }
}

impl From<LogRecord> for Record {
    fn from(r: LogRecord) -> Self {
        Record::Log(r)
    }
}

impl From<FaultRecord> for Record {
    fn from(r: FaultRecord) -> Self {
        Record::Fault(r)
    }
}
