//! Common envelope shared by every captured record

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identity and correlation data carried by every record kind.
///
/// `id` and `timestamp` are assigned once at construction and have no
/// setters; everything else may be filled in while the record is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    id: String,
    /// Owning request's correlation identifier (empty when there is none)
    #[serde(default)]
    pub request_id: String,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl Envelope {
    /// New envelope with a fresh identifier, stamped now
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// New envelope with a fresh identifier and an explicit timestamp
    pub fn at(timestamp: DateTime<Utc>) -> Self {
        Self::with_id(new_record_id(), timestamp)
    }

    /// Envelope with a caller-chosen identifier.
    ///
    /// Used when the identifier was minted earlier, e.g. carried through
    /// the command-text token of a nested call.
    pub fn with_id(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            request_id: String::new(),
            timestamp,
            correlation_id: None,
            session_id: None,
            user_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Whether this record belongs to a request
    pub fn has_request(&self) -> bool {
        !self.request_id.is_empty()
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new()
    }
}

/// Generate a globally unique record identifier
pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
