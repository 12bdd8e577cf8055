//! Captured inbound request

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Envelope, FaultRecord, LogRecord, SqlQueryRecord};

/// One observed request/response exchange plus everything it caused
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestRecord {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query_string: String,
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub execution_time_ms: u64,
    /// Request headers with denylisted names removed
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_address: Option<String>,
    #[serde(default)]
    pub request_size: u64,
    #[serde(default)]
    pub response_size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default)]
    pub is_https: bool,
    #[serde(default)]
    pub is_slow: bool,
    #[serde(default)]
    pub sql_queries: Vec<SqlQueryRecord>,
    #[serde(default)]
    pub logs: Vec<LogRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<FaultRecord>,
}

impl RequestRecord {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Path plus query string, as the client sent it
    pub fn full_path(&self) -> String {
        if self.query_string.is_empty() {
            self.path.clone()
        } else {
            format!("{}?{}", self.path, self.query_string)
        }
    }

    /// `METHOD path`, used to group requests per endpoint
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn is_error(&self) -> bool {
        self.status_code >= 400
    }
}
