//! The telemetry store
//!
//! Four independently indexed collections behind one lock, optionally
//! backed by an append-only journal. Every write hits the journal before
//! the in-memory image, so a failed append leaves the image unchanged.

use std::path::Path;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::config::{CaptureConfig, LARGE_DATABASE_BYTES};
use crate::error::{StoreError, StoreResult};
use crate::types::{
    ExportData, FaultRecord, Filter, LogRecord, PagedResult, PerformanceMetrics, Record,
    RecordKind, RequestRecord, SqlQueryRecord, StatsSnapshot, StoreHealth,
};

use super::collection::Collection;
use super::journal::{encoded_len, Journal, JournalOp};
use super::{query, stats};

struct Inner {
    requests: Collection,
    queries: Collection,
    logs: Collection,
    faults: Collection,
    journal: Option<Journal>,
}

impl Inner {
    fn new(journal: Option<Journal>) -> Self {
        Self {
            requests: Collection::new(RecordKind::Request),
            queries: Collection::new(RecordKind::Query),
            logs: Collection::new(RecordKind::Log),
            faults: Collection::new(RecordKind::Fault),
            journal,
        }
    }

    fn collection(&self, kind: RecordKind) -> &Collection {
        match kind {
            RecordKind::Request => &self.requests,
            RecordKind::Query => &self.queries,
            RecordKind::Log => &self.logs,
            RecordKind::Fault => &self.faults,
        }
    }

    fn collection_mut(&mut self, kind: RecordKind) -> &mut Collection {
        match kind {
            RecordKind::Request => &mut self.requests,
            RecordKind::Query => &mut self.queries,
            RecordKind::Log => &mut self.logs,
            RecordKind::Fault => &mut self.faults,
        }
    }

    fn collections(&self) -> [&Collection; 4] {
        [&self.requests, &self.queries, &self.logs, &self.faults]
    }

    fn apply(&mut self, op: JournalOp) -> StoreResult<()> {
        match op {
            JournalOp::Insert { record } => {
                let bytes = encoded_len(&record)?;
                self.collection_mut(record.kind()).insert(record, bytes);
            }
            JournalOp::Delete { kind, ids } => {
                let collection = self.collection_mut(kind);
                for id in &ids {
                    collection.remove(id);
                }
            }
            JournalOp::Clear => {
                for kind in RecordKind::ALL {
                    self.collection_mut(kind).clear();
                }
            }
        }
        Ok(())
    }

    fn delete(&mut self, kind: RecordKind, ids: Vec<String>) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        if let Some(journal) = self.journal.as_mut() {
            journal.append_delete(kind, &ids)?;
        }
        let collection = self.collection_mut(kind);
        Ok(ids.iter().filter(|id| collection.remove(id).is_some()).count())
    }

    fn count(&self) -> usize {
        self.collections().iter().map(|c| c.len()).sum()
    }
}

/// Embedded, indexed store for all four record kinds.
///
/// Once [`close`](Self::close)d, every operation returns
/// [`StoreError::Closed`].
pub struct TelemetryStore {
    inner: RwLock<Option<Inner>>,
}

impl TelemetryStore {
    /// Store that lives only in memory
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Some(Inner::new(None))),
        }
    }

    /// Open a journal-backed store, replaying whatever the journal holds
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        let (journal, ops) = Journal::open(path)?;
        let replayed = ops.len();

        let mut inner = Inner::new(Some(journal));
        for op in ops {
            inner.apply(op)?;
        }
        info!(
            path = %path.display(),
            ops = replayed,
            records = inner.count(),
            "Telemetry journal loaded"
        );

        Ok(Self {
            inner: RwLock::new(Some(inner)),
        })
    }

    /// In-memory or journal-backed, per `config.database_path`
    pub fn from_config(config: &CaptureConfig) -> StoreResult<Self> {
        match config.journal_path() {
            Some(path) => Self::open(path),
            None => Ok(Self::in_memory()),
        }
    }

    fn read<T>(&self, f: impl FnOnce(&Inner) -> StoreResult<T>) -> StoreResult<T> {
        let guard = self.inner.read();
        let inner = guard.as_ref().ok_or(StoreError::Closed)?;
        f(inner)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Inner) -> StoreResult<T>) -> StoreResult<T> {
        let mut guard = self.inner.write();
        let inner = guard.as_mut().ok_or(StoreError::Closed)?;
        f(inner)
    }

    /// Store a record (replacing any record with the same id) and return its id
    pub fn insert(&self, record: impl Into<Record>) -> StoreResult<String> {
        let record = record.into();
        let id = record.id().to_string();
        self.write(|inner| {
            let bytes = match inner.journal.as_mut() {
                Some(journal) => journal.append_insert(&record)?,
                None => encoded_len(&record)?,
            };
            inner.collection_mut(record.kind()).insert(record, bytes);
            Ok(())
        })?;
        Ok(id)
    }

    pub fn get(&self, kind: RecordKind, id: &str) -> StoreResult<Option<Record>> {
        self.read(|inner| Ok(inner.collection(kind).get(id).map(|s| s.record.clone())))
    }

    pub fn get_request(&self, id: &str) -> StoreResult<Option<RequestRecord>> {
        Ok(match self.get(RecordKind::Request, id)? {
            Some(Record::Request(r)) => Some(r),
            _ => None,
        })
    }

    pub fn get_query(&self, id: &str) -> StoreResult<Option<SqlQueryRecord>> {
        Ok(match self.get(RecordKind::Query, id)? {
            Some(Record::Query(r)) => Some(r),
            _ => None,
        })
    }

    pub fn get_log(&self, id: &str) -> StoreResult<Option<LogRecord>> {
        Ok(match self.get(RecordKind::Log, id)? {
            Some(Record::Log(r)) => Some(r),
            _ => None,
        })
    }

    pub fn get_fault(&self, id: &str) -> StoreResult<Option<FaultRecord>> {
        Ok(match self.get(RecordKind::Fault, id)? {
            Some(Record::Fault(r)) => Some(r),
            _ => None,
        })
    }

    /// Filter, sort and page one collection. The filter is normalized first.
    pub fn query(&self, kind: RecordKind, filter: &Filter) -> StoreResult<PagedResult<Record>> {
        let filter = filter.clone().normalized();
        self.read(|inner| Ok(query::run(inner.collection(kind), &filter)))
    }

    pub fn query_requests(&self, filter: &Filter) -> StoreResult<PagedResult<RequestRecord>> {
        Ok(typed(self.query(RecordKind::Request, filter)?, |r| match r {
            Record::Request(r) => Some(r),
            _ => None,
        }))
    }

    pub fn query_queries(&self, filter: &Filter) -> StoreResult<PagedResult<SqlQueryRecord>> {
        Ok(typed(self.query(RecordKind::Query, filter)?, |r| match r {
            Record::Query(r) => Some(r),
            _ => None,
        }))
    }

    pub fn query_logs(&self, filter: &Filter) -> StoreResult<PagedResult<LogRecord>> {
        Ok(typed(self.query(RecordKind::Log, filter)?, |r| match r {
            Record::Log(r) => Some(r),
            _ => None,
        }))
    }

    pub fn query_faults(&self, filter: &Filter) -> StoreResult<PagedResult<FaultRecord>> {
        Ok(typed(self.query(RecordKind::Fault, filter)?, |r| match r {
            Record::Fault(r) => Some(r),
            _ => None,
        }))
    }

    /// Case-insensitive text match over `kinds` (all kinds when empty),
    /// newest first, capped at `max_results`. A blank term matches nothing.
    pub fn search(
        &self,
        term: &str,
        kinds: &[RecordKind],
        max_results: usize,
    ) -> StoreResult<Vec<Record>> {
        let kinds: &[RecordKind] = if kinds.is_empty() { &RecordKind::ALL } else { kinds };
        self.read(|inner| {
            let collections = RecordKind::ALL
                .into_iter()
                .filter(|kind| kinds.contains(kind))
                .map(|kind| inner.collection(kind));
            Ok(query::search(collections, term, max_results))
        })
    }

    pub fn stats(&self) -> StoreResult<StatsSnapshot> {
        let size = self.size()?;
        self.read(|inner| {
            let mut snapshot =
                stats::snapshot(&inner.requests, &inner.queries, &inner.logs, &inner.faults);
            snapshot.database_size = size;
            Ok(snapshot)
        })
    }

    /// Request timing over the last `window`
    pub fn performance(&self, window: Duration) -> StoreResult<PerformanceMetrics> {
        self.performance_at(window, Utc::now())
    }

    pub fn performance_at(
        &self,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<PerformanceMetrics> {
        self.read(|inner| Ok(stats::performance(&inner.requests, window, now)))
    }

    /// Delete every record strictly older than `cutoff`, across all kinds
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        self.write(|inner| {
            let mut removed = 0;
            for kind in RecordKind::ALL {
                let ids = inner.collection(kind).ids_older_than(cutoff);
                removed += inner.delete(kind, ids)?;
            }
            if removed > 0 {
                debug!(removed, %cutoff, "Deleted records past retention");
            }
            Ok(removed)
        })
    }

    /// Trim each kind to at most `max_count` records, oldest first
    pub fn evict_to_bound(&self, max_count: usize) -> StoreResult<usize> {
        self.write(|inner| {
            let mut removed = 0;
            for kind in RecordKind::ALL {
                let len = inner.collection(kind).len();
                if len > max_count {
                    let ids = inner.collection(kind).oldest_ids(len - max_count);
                    removed += inner.delete(kind, ids)?;
                }
            }
            Ok(removed)
        })
    }

    /// Delete the given ids from one collection; unknown ids are ignored
    pub fn delete_ids(&self, kind: RecordKind, ids: &[String]) -> StoreResult<usize> {
        self.write(|inner| {
            let present: Vec<String> = ids
                .iter()
                .filter(|id| inner.collection(kind).get(id).is_some())
                .cloned()
                .collect();
            inner.delete(kind, present)
        })
    }

    pub fn clear_all(&self) -> StoreResult<()> {
        self.write(|inner| {
            if let Some(journal) = inner.journal.as_mut() {
                journal.append_clear()?;
            }
            for kind in RecordKind::ALL {
                inner.collection_mut(kind).clear();
            }
            Ok(())
        })
    }

    /// Records across all kinds
    pub fn count(&self) -> StoreResult<usize> {
        self.read(|inner| Ok(inner.count()))
    }

    pub fn count_of(&self, kind: RecordKind) -> StoreResult<usize> {
        self.read(|inner| Ok(inner.collection(kind).len()))
    }

    /// Journal size on disk, or the encoded size of live records in memory
    pub fn size(&self) -> StoreResult<u64> {
        self.read(|inner| {
            Ok(match &inner.journal {
                Some(journal) => journal.bytes(),
                None => inner.collections().iter().map(|c| c.bytes()).sum(),
            })
        })
    }

    pub fn is_durable(&self) -> StoreResult<bool> {
        self.read(|inner| Ok(inner.journal.is_some()))
    }

    pub fn health(&self) -> StoreResult<StoreHealth> {
        let database_size = self.size()?;
        let durable = self.is_durable()?;
        let status = if database_size > LARGE_DATABASE_BYTES {
            "degraded"
        } else {
            "healthy"
        };
        Ok(StoreHealth {
            status: status.to_string(),
            durable,
            database_size,
            total_entries: self.count()?,
            requests: self.count_of(RecordKind::Request)?,
            queries: self.count_of(RecordKind::Query)?,
            logs: self.count_of(RecordKind::Log)?,
            faults: self.count_of(RecordKind::Fault)?,
            checked_at: Utc::now(),
        })
    }

    /// Rewrite the journal with only live records.
    ///
    /// Returns false for an in-memory store, where there is nothing to do.
    pub fn compact(&self) -> StoreResult<bool> {
        self.write(|inner| {
            let Inner {
                requests,
                queries,
                logs,
                faults,
                journal,
            } = inner;
            let Some(journal) = journal.as_mut() else {
                return Ok(false);
            };

            let before = journal.bytes();
            let records = [&*requests, &*queries, &*logs, &*faults]
                .into_iter()
                .flat_map(|c| c.iter_by_time().map(|s| &s.record));
            journal.rewrite(records)?;
            debug!(
                path = %journal.path().display(),
                before,
                after = journal.bytes(),
                "Journal compacted"
            );
            Ok(true)
        })
    }

    /// Every record, oldest first per kind
    pub fn export(&self) -> StoreResult<ExportData> {
        self.read(|inner| {
            let mut data = ExportData {
                exported_at: Some(Utc::now()),
                ..Default::default()
            };
            for stored in inner.requests.iter_by_time() {
                if let Record::Request(r) = &stored.record {
                    data.requests.push(r.clone());
                }
            }
            for stored in inner.queries.iter_by_time() {
                if let Record::Query(r) = &stored.record {
                    data.queries.push(r.clone());
                }
            }
            for stored in inner.logs.iter_by_time() {
                if let Record::Log(r) = &stored.record {
                    data.logs.push(r.clone());
                }
            }
            for stored in inner.faults.iter_by_time() {
                if let Record::Fault(r) = &stored.record {
                    data.faults.push(r.clone());
                }
            }
            Ok(data)
        })
    }

    /// Flush the journal and release everything. Later calls fail with
    /// [`StoreError::Closed`]; closing twice is a no-op.
    pub fn close(&self) -> StoreResult<()> {
        let inner = self.inner.write().take();
        if let Some(mut inner) = inner {
            if let Some(journal) = inner.journal.as_mut() {
                journal.sync()?;
            }
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().is_none()
    }
}

impl std::fmt::Debug for TelemetryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let guard = self.inner.read();
        match guard.as_ref() {
            Some(inner) => f
                .debug_struct("TelemetryStore")
                .field("records", &inner.count())
                .field("durable", &inner.journal.is_some())
                .finish(),
            None => f.debug_struct("TelemetryStore").field("closed", &true).finish(),
        }
    }
}

fn typed<T>(page: PagedResult<Record>, f: impl Fn(Record) -> Option<T>) -> PagedResult<T> {
    let PagedResult {
        items,
        total_count,
        page,
        page_size,
        total_pages,
    } = page;
    PagedResult {
        items: items.into_iter().filter_map(f).collect(),
        total_count,
        page,
        page_size,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Envelope;
    use tempfile::TempDir;

    fn request_at(ts: DateTime<Utc>) -> RequestRecord {
        let mut r = RequestRecord::new("GET", "/");
        r.envelope = Envelope::at(ts);
        r
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let store = TelemetryStore::in_memory();
        store.insert(LogRecord::new("Info", "a")).unwrap();
        store.close().unwrap();
        store.close().unwrap();

        assert!(store.is_closed());
        assert!(matches!(store.count(), Err(StoreError::Closed)));
        assert!(matches!(
            store.insert(LogRecord::new("Info", "b")),
            Err(StoreError::Closed)
        ));
        assert!(matches!(store.stats(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_typed_get_checks_kind() {
        let store = TelemetryStore::in_memory();
        let id = store.insert(LogRecord::new("Info", "a")).unwrap();
        assert!(store.get_log(&id).unwrap().is_some());
        assert!(store.get_request(&id).unwrap().is_none());
        assert!(store.get(RecordKind::Fault, &id).unwrap().is_none());
    }

    #[test]
    fn test_delete_older_than_is_strict() {
        let store = TelemetryStore::in_memory();
        let cutoff = Utc::now();
        store.insert(request_at(cutoff - Duration::seconds(1))).unwrap();
        store.insert(request_at(cutoff)).unwrap();
        let mut log = LogRecord::new("Info", "old");
        log.envelope = Envelope::at(cutoff - Duration::days(8));
        store.insert(log).unwrap();

        assert_eq!(store.delete_older_than(cutoff).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_evict_bounds_each_kind_independently() {
        let store = TelemetryStore::in_memory();
        let base = Utc::now();
        for i in 0..4 {
            store.insert(request_at(base + Duration::seconds(i))).unwrap();
        }
        store.insert(LogRecord::new("Info", "only one")).unwrap();

        assert_eq!(store.evict_to_bound(2).unwrap(), 2);
        assert_eq!(store.count_of(RecordKind::Request).unwrap(), 2);
        assert_eq!(store.count_of(RecordKind::Log).unwrap(), 1);
    }

    #[test]
    fn test_search_respects_kinds_and_cap() {
        let store = TelemetryStore::in_memory();
        store.insert(RequestRecord::new("GET", "/orders/1")).unwrap();
        store.insert(LogRecord::new("Info", "loaded orders")).unwrap();
        store.insert(LogRecord::new("Info", "Orders cached")).unwrap();
        store.insert(LogRecord::new("Info", "idle")).unwrap();

        assert_eq!(store.search("ORDERS", &[], 10).unwrap().len(), 3);
        let logs = store.search("orders", &[RecordKind::Log], 10).unwrap();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|r| r.kind() == RecordKind::Log));
        assert_eq!(store.search("orders", &[], 1).unwrap().len(), 1);
        assert!(store.search("", &[], 10).unwrap().is_empty());

        store.close().unwrap();
        assert!(matches!(store.search("orders", &[], 10), Err(StoreError::Closed)));
    }

    #[test]
    fn test_health_reports_counts_and_durability() {
        let store = TelemetryStore::in_memory();
        store.insert(request_at(Utc::now())).unwrap();
        store.insert(LogRecord::new("Info", "a")).unwrap();
        store.insert(LogRecord::new("Info", "b")).unwrap();

        let health = store.health().unwrap();
        assert_eq!(health.status, "healthy");
        assert!(!health.durable);
        assert_eq!(health.total_entries, 3);
        assert_eq!(health.requests, 1);
        assert_eq!(health.logs, 2);
        assert_eq!(health.faults, 0);
        assert_eq!(health.database_size, store.size().unwrap());
    }

    #[test]
    fn test_memory_size_tracks_live_records() {
        let store = TelemetryStore::in_memory();
        assert_eq!(store.size().unwrap(), 0);
        let id = store.insert(LogRecord::new("Info", "sized")).unwrap();
        assert!(store.size().unwrap() > 0);
        assert_eq!(store.delete_ids(RecordKind::Log, &[id, "nope".into()]).unwrap(), 1);
        assert_eq!(store.size().unwrap(), 0);
        assert!(!store.compact().unwrap());
    }

    #[test]
    fn test_journal_survives_reopen_and_compaction() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("telemetry.jsonl");

        let kept_id;
        {
            let store = TelemetryStore::open(&path).unwrap();
            assert!(store.is_durable().unwrap());
            kept_id = store.insert(LogRecord::new("Info", "keep")).unwrap();
            let gone = store.insert(LogRecord::new("Info", "gone")).unwrap();
            store.delete_ids(RecordKind::Log, &[gone]).unwrap();

            let before = store.size().unwrap();
            assert!(store.compact().unwrap());
            assert!(store.size().unwrap() < before);
            store.close().unwrap();
        }

        let store = TelemetryStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get_log(&kept_id).unwrap().unwrap().message, "keep");
        assert_eq!(store.size().unwrap(), std::fs::metadata(&path).unwrap().len());
    }
}
