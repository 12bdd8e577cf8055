//! Captured nested data-access call

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Envelope;

/// Sentinel stored for parameters whose value was null
pub const NULL_PARAMETER: &str = "NULL";

/// A single command executed against the host's data store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlQueryRecord {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub query: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default)]
    pub rows_affected: i64,
    #[serde(default = "default_successful")]
    pub is_successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Connection descriptor with secrets masked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_type: Option<String>,
    #[serde(default)]
    pub is_slow_query: bool,
}

fn default_successful() -> bool {
    true
}

impl SqlQueryRecord {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    /// Store a parameter, normalizing null to [`NULL_PARAMETER`]
    pub fn set_parameter(&mut self, name: impl Into<String>, value: Value) {
        let value = if value.is_null() {
            Value::String(NULL_PARAMETER.to_string())
        } else {
            value
        };
        self.parameters.insert(name.into(), value);
    }
}

impl Default for SqlQueryRecord {
    fn default() -> Self {
        Self {
            envelope: Envelope::new(),
            query: String::new(),
            parameters: BTreeMap::new(),
            execution_time_ms: 0,
            rows_affected: 0,
            is_successful: true,
            error: None,
            connection: None,
            database: None,
            command_type: None,
            is_slow_query: false,
        }
    }
}
