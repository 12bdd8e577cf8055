//! Unhandled fault observed while serving a request

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Envelope;

/// Maximum number of links in an inner-fault chain
pub const MAX_FAULT_DEPTH: usize = 16;

/// Marker stored when a data value could not be serialized
pub const SERIALIZATION_ERROR_MARKER: &str = "[Serialization Error]";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaultRecord {
    #[serde(flatten)]
    pub envelope: Envelope,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub fault_type: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner: Option<Box<FaultRecord>>,
}

impl FaultRecord {
    pub fn new(fault_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            fault_type: fault_type.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    /// Store a data value as JSON text, degrading to a marker on failure
    pub fn insert_data<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) {
        let text = serde_json::to_string(value)
            .unwrap_or_else(|_| SERIALIZATION_ERROR_MARKER.to_string());
        self.data.insert(key.into(), text);
    }

    /// Number of links in this chain, including `self`
    pub fn chain_len(&self) -> usize {
        let mut len = 1;
        let mut current = self.inner.as_deref();
        while let Some(fault) = current {
            len += 1;
            current = fault.inner.as_deref();
        }
        len
    }

    /// Link `links` into a chain, outermost first, keeping at most
    /// [`MAX_FAULT_DEPTH`] entries.
    pub fn chain(links: Vec<FaultRecord>) -> Option<FaultRecord> {
        let mut links = links;
        links.truncate(MAX_FAULT_DEPTH);

        let mut chained: Option<FaultRecord> = None;
        while let Some(mut link) = links.pop() {
            link.inner = chained.map(Box::new);
            chained = Some(link);
        }
        chained
    }
}
