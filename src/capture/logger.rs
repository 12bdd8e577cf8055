//! Application logging into the dashboard

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::correlation::CorrelationBuffer;
use crate::types::{level, LogRecord};

use super::Recorder;

/// Persists log statements and attaches them to their in-flight request
#[derive(Clone)]
pub struct DebugLogger {
    buffer: Arc<CorrelationBuffer>,
    recorder: Arc<Recorder>,
    enabled: bool,
}

impl DebugLogger {
    pub fn new(buffer: Arc<CorrelationBuffer>, recorder: Arc<Recorder>) -> Self {
        Self {
            buffer,
            recorder,
            enabled: true,
        }
    }

    /// A disabled logger builds records but neither buffers nor stores them
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn log(
        &self,
        level: &str,
        message: impl Into<String>,
        tag: Option<&str>,
        properties: BTreeMap<String, Value>,
        request_id: Option<&str>,
    ) -> LogRecord {
        let mut record = LogRecord::new(level, message);
        record.tag = tag.map(String::from);
        record.properties = properties;
        if !self.enabled {
            return record;
        }
        if let Some(request_id) = request_id.filter(|id| !id.is_empty()) {
            record.envelope.request_id = request_id.to_string();
            self.buffer.attach_log(request_id, record.clone());
        }
        self.recorder.record_log(record.clone());
        record
    }

    pub fn info(&self, message: impl Into<String>, request_id: Option<&str>) -> LogRecord {
        self.log(level::INFO, message, None, BTreeMap::new(), request_id)
    }

    pub fn warning(&self, message: impl Into<String>, request_id: Option<&str>) -> LogRecord {
        self.log(level::WARNING, message, None, BTreeMap::new(), request_id)
    }

    pub fn error(&self, message: impl Into<String>, request_id: Option<&str>) -> LogRecord {
        self.log(level::ERROR, message, None, BTreeMap::new(), request_id)
    }

    pub fn success(&self, message: impl Into<String>, request_id: Option<&str>) -> LogRecord {
        self.log(level::SUCCESS, message, None, BTreeMap::new(), request_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NoopNotifier;
    use crate::store::TelemetryStore;
    use crate::types::{Filter, RecordKind, RequestRecord};

    #[test]
    fn test_logs_are_stored_and_attached() {
        let store = Arc::new(TelemetryStore::in_memory());
        let buffer = Arc::new(CorrelationBuffer::new());
        let recorder = Arc::new(Recorder::new(Arc::clone(&store), Arc::new(NoopNotifier)));
        let logger = DebugLogger::new(Arc::clone(&buffer), recorder);

        buffer.begin("req-9", RequestRecord::new("GET", "/"));
        let mut props = BTreeMap::new();
        props.insert("user".to_string(), Value::from(17));
        logger.log("Warning", "quota close", Some("billing"), props, Some("req-9"));
        logger.success("background job done", None);

        assert_eq!(store.count_of(RecordKind::Log).unwrap(), 2);
        let mut filter = Filter::default();
        filter.tag = Some("BILLING".to_string());
        let page = store.query_logs(&filter).unwrap();
        assert_eq!(page.items[0].envelope.request_id, "req-9");
        assert_eq!(page.items[0].properties["user"], 17);

        let sealed = buffer.complete("req-9").unwrap();
        assert_eq!(sealed.logs.len(), 1);
        assert_eq!(sealed.logs[0].message, "quota close");
    }
}
