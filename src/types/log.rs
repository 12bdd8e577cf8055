//! Application log statement

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Envelope;

/// Commonly used log levels. The level field itself is open.
pub mod level {
    pub const INFO: &str = "Info";
    pub const WARNING: &str = "Warning";
    pub const ERROR: &str = "Error";
    pub const SUCCESS: &str = "Success";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub level: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    /// Identifier of a related fault record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault_id: Option<String>,
}

impl LogRecord {
    pub fn new(level: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: level.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

impl Default for LogRecord {
    fn default() -> Self {
        Self {
            envelope: Envelope::new(),
            level: level::INFO.to_string(),
            message: String::new(),
            category: None,
            tag: None,
            properties: BTreeMap::new(),
            fault_id: None,
        }
    }
}
