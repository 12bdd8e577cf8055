//! Persistence for captured records
//!
//! Capture must never fail the request it observes, so every store error
//! is swallowed here and reported on the `reqtrace::capture` target.

use std::sync::Arc;

use tracing::warn;

use crate::error::StoreResult;
use crate::notify::{DashboardEvent, Notifier};
use crate::store::TelemetryStore;
use crate::types::{
    FaultRecord, LogRecord, Record, RecordKind, RequestRecord, SqlQueryRecord, StatsSnapshot,
};

/// Writes records to the store and announces them
pub struct Recorder {
    store: Arc<TelemetryStore>,
    notifier: Arc<dyn Notifier>,
}

impl Recorder {
    pub fn new(store: Arc<TelemetryStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        &self.store
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    pub fn record_request(&self, request: RequestRecord) -> Option<String> {
        let event = DashboardEvent::new_request(&request);
        let id = self.persist(request.into(), event)?;
        if let Some(stats) = self.counts() {
            self.notifier.notify(DashboardEvent::stats_updated(&stats));
        }
        Some(id)
    }

    pub fn record_query(&self, query: SqlQueryRecord) -> Option<String> {
        let event = DashboardEvent::new_query(&query);
        self.persist(query.into(), event)
    }

    pub fn record_log(&self, log: LogRecord) -> Option<String> {
        let event = DashboardEvent::new_log(&log);
        self.persist(log.into(), event)
    }

    pub fn record_fault(&self, fault: FaultRecord) -> Option<String> {
        let event = DashboardEvent::new_fault(&fault);
        self.persist(fault.into(), event)
    }

    /// Drop every stored record and tell the dashboard
    pub fn clear_all(&self) -> StoreResult<()> {
        self.store.clear_all()?;
        self.notifier.notify(DashboardEvent::DataCleared);
        Ok(())
    }

    fn persist(&self, record: Record, event: DashboardEvent) -> Option<String> {
        let kind = record.kind();
        match self.store.insert(record) {
            Ok(id) => {
                self.notifier.notify(event);
                Some(id)
            }
            Err(e) => {
                warn!(target: "reqtrace::capture", %kind, error = %e, "Failed to store captured record");
                None
            }
        }
    }

    fn counts(&self) -> Option<StatsSnapshot> {
        let count = |kind| self.store.count_of(kind).ok();
        Some(StatsSnapshot {
            total_requests: count(RecordKind::Request)?,
            total_queries: count(RecordKind::Query)?,
            total_logs: count(RecordKind::Log)?,
            total_faults: count(RecordKind::Fault)?,
            ..Default::default()
        })
    }
}
