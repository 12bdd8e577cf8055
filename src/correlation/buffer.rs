//! In-flight request state

use std::collections::HashMap;

use parking_lot::{Mutex, RwLock};

use crate::types::{FaultRecord, LogRecord, RequestRecord, SqlQueryRecord};

/// Accumulating state of one request
#[derive(Debug)]
struct Entry {
    request: RequestRecord,
    queries: Vec<SqlQueryRecord>,
    logs: Vec<LogRecord>,
    fault: Option<FaultRecord>,
}

/// Holds requests between `begin` and `complete`.
///
/// The outer map is only write-locked to register or remove an entry.
/// Attaching takes the read lock plus the entry's own mutex, so producers
/// on different requests never block each other and `complete` cannot
/// remove an entry while an append to it is in progress.
#[derive(Debug, Default)]
pub struct CorrelationBuffer {
    entries: RwLock<HashMap<String, Mutex<Entry>>>,
    /// Provisional query id -> owning request id
    query_owners: Mutex<HashMap<String, String>>,
}

impl CorrelationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an in-flight request. Returns false if `request_id` is
    /// already active, leaving the existing entry untouched.
    pub fn begin(&self, request_id: &str, mut request: RequestRecord) -> bool {
        let mut entries = self.entries.write();
        if entries.contains_key(request_id) {
            return false;
        }
        request.envelope.request_id = request_id.to_string();
        entries.insert(
            request_id.to_string(),
            Mutex::new(Entry {
                request,
                queries: Vec::new(),
                logs: Vec::new(),
                fault: None,
            }),
        );
        true
    }

    pub fn is_active(&self, request_id: &str) -> bool {
        self.entries.read().contains_key(request_id)
    }

    /// Number of requests currently in flight
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a nested call. Dropped when the request is not in flight.
    pub fn attach_query(&self, request_id: &str, query: SqlQueryRecord) -> bool {
        // The owner is recorded while the entry is held, so `complete`
        // always sees it and removes it
        self.with_entry(request_id, |entry| {
            self.query_owners
                .lock()
                .insert(query.envelope.id().to_string(), request_id.to_string());
            entry.queries.push(query);
        })
    }

    /// Append a log statement. Dropped when the request is not in flight.
    pub fn attach_log(&self, request_id: &str, log: LogRecord) -> bool {
        self.with_entry(request_id, |entry| entry.logs.push(log))
    }

    /// Attach a fault, replacing any earlier one
    pub fn set_fault(&self, request_id: &str, fault: FaultRecord) -> bool {
        self.with_entry(request_id, |entry| entry.fault = Some(fault))
    }

    /// Provisional queries still waiting for their completion callback
    pub fn pending_queries(&self) -> usize {
        self.query_owners.lock().len()
    }

    /// Owning request of a provisional query, while that request is in flight
    pub fn owner_of_query(&self, query_id: &str) -> Option<String> {
        self.query_owners.lock().get(query_id).cloned()
    }

    /// Swap the provisional copy of `completed` for the completed one.
    ///
    /// Returns false when the owning request has already completed or the
    /// query was never attached.
    pub fn resolve_query(&self, completed: &SqlQueryRecord) -> bool {
        let owner = match self.query_owners.lock().remove(completed.envelope.id()) {
            Some(owner) => owner,
            None => return false,
        };
        self.with_entry(&owner, |entry| {
            if let Some(slot) = entry
                .queries
                .iter_mut()
                .find(|q| q.envelope.id() == completed.envelope.id())
            {
                *slot = completed.clone();
            }
        })
    }

    /// Remove the entry and return the request with its nested lists
    /// folded in. `None` if never begun or already completed.
    pub fn complete(&self, request_id: &str) -> Option<RequestRecord> {
        let entry = self.entries.write().remove(request_id)?.into_inner();

        if !entry.queries.is_empty() {
            let mut owners = self.query_owners.lock();
            for query in &entry.queries {
                owners.remove(query.envelope.id());
            }
        }

        let mut request = entry.request;
        request.sql_queries = entry.queries;
        request.logs = entry.logs;
        if entry.fault.is_some() {
            request.fault = entry.fault;
        }
        Some(request)
    }

    fn with_entry(&self, request_id: &str, f: impl FnOnce(&mut Entry)) -> bool {
        if request_id.is_empty() {
            return false;
        }
        let entries = self.entries.read();
        match entries.get(request_id) {
            Some(entry) => {
                f(&mut *entry.lock());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_begin_is_idempotent() {
        let buffer = CorrelationBuffer::new();
        assert!(buffer.begin("r1", RequestRecord::new("GET", "/a")));
        assert!(!buffer.begin("r1", RequestRecord::new("POST", "/b")));

        let sealed = buffer.complete("r1").unwrap();
        assert_eq!(sealed.method, "GET");
        assert_eq!(sealed.envelope.request_id, "r1");
    }

    #[test]
    fn test_complete_twice_returns_none() {
        let buffer = CorrelationBuffer::new();
        buffer.begin("r1", RequestRecord::default());
        assert!(buffer.complete("r1").is_some());
        assert!(buffer.complete("r1").is_none());
        assert!(buffer.complete("never").is_none());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_orphan_events_are_dropped() {
        let buffer = CorrelationBuffer::new();
        assert!(!buffer.attach_log("missing", LogRecord::new("Info", "job")));
        assert!(!buffer.attach_query("", SqlQueryRecord::new("SELECT 1")));
        assert!(!buffer.set_fault("missing", FaultRecord::new("E", "x")));
    }

    #[test]
    fn test_complete_releases_owners_attached_concurrently() {
        let buffer = Arc::new(CorrelationBuffer::new());
        for round in 0..50 {
            let request_id = format!("r{round}");
            buffer.begin(&request_id, RequestRecord::default());

            let attacher = {
                let buffer = Arc::clone(&buffer);
                let request_id = request_id.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        buffer.attach_query(&request_id, SqlQueryRecord::new(format!("SELECT {i}")));
                    }
                })
            };
            thread::yield_now();
            buffer.complete(&request_id);
            attacher.join().unwrap();

            // Commands that never complete must not pin their owner
            assert_eq!(buffer.pending_queries(), 0, "round {round}");
        }
    }

    #[test]
    fn test_complete_folds_nested_lists() {
        let buffer = CorrelationBuffer::new();
        buffer.begin("r1", RequestRecord::new("GET", "/orders"));
        buffer.attach_query("r1", SqlQueryRecord::new("SELECT 1"));
        buffer.attach_log("r1", LogRecord::new("Info", "loaded"));
        buffer.set_fault("r1", FaultRecord::new("Timeout", "slow db"));

        let sealed = buffer.complete("r1").unwrap();
        assert_eq!(sealed.sql_queries.len(), 1);
        assert_eq!(sealed.logs.len(), 1);
        assert_eq!(sealed.fault.unwrap().fault_type, "Timeout");
    }

    #[test]
    fn test_resolve_query_replaces_provisional_copy() {
        let buffer = CorrelationBuffer::new();
        buffer.begin("r1", RequestRecord::default());

        let provisional = SqlQueryRecord::new("SELECT 1");
        let id = provisional.envelope.id().to_string();
        buffer.attach_query("r1", provisional.clone());
        assert_eq!(buffer.owner_of_query(&id).as_deref(), Some("r1"));

        let mut completed = provisional;
        completed.execution_time_ms = 42;
        completed.rows_affected = 3;
        assert!(buffer.resolve_query(&completed));
        assert!(buffer.owner_of_query(&id).is_none());

        let sealed = buffer.complete("r1").unwrap();
        assert_eq!(sealed.sql_queries, vec![completed]);
    }

    #[test]
    fn test_concurrent_attach_loses_nothing() {
        let buffer = Arc::new(CorrelationBuffer::new());
        buffer.begin("shared", RequestRecord::default());
        buffer.begin("other", RequestRecord::default());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for i in 0..50 {
                        buffer.attach_log("shared", LogRecord::new("Info", format!("{t}-{i}")));
                        buffer.attach_query("other", SqlQueryRecord::new(format!("q{t}-{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let shared = buffer.complete("shared").unwrap();
        let mut messages: Vec<_> = shared.logs.iter().map(|l| l.message.clone()).collect();
        messages.sort();
        messages.dedup();
        assert_eq!(messages.len(), 400);
        assert_eq!(buffer.complete("other").unwrap().sql_queries.len(), 400);
    }
}
