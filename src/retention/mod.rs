//! Background retention loop
//!
//! Each iteration deletes records older than the retention window, trims
//! every kind to the entry ceiling and compacts the journal when the store
//! is file-backed. The next sleep starts only after an iteration finishes,
//! so iterations never overlap. A failed iteration is logged and retried
//! after the shorter back-off interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{CaptureConfig, LARGE_DATABASE_BYTES};
use crate::error::StoreResult;
use crate::store::TelemetryStore;

/// What one retention iteration did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionReport {
    pub count_before: usize,
    pub count_after: usize,
    pub size_before: u64,
    pub size_after: u64,
    pub removed_by_age: usize,
    pub removed_by_bound: usize,
    pub compacted: bool,
}

impl RetentionReport {
    pub fn removed(&self) -> usize {
        self.removed_by_age + self.removed_by_bound
    }
}

/// Periodic eviction by age and by per-kind count
#[derive(Debug, Clone)]
pub struct RetentionScheduler {
    store: Arc<TelemetryStore>,
    retention: Duration,
    max_entries: usize,
    interval: Duration,
    backoff: Duration,
}

impl RetentionScheduler {
    pub fn new(store: Arc<TelemetryStore>, config: &CaptureConfig) -> Self {
        Self {
            store,
            retention: config.retention_period(),
            max_entries: config.max_entries,
            interval: config.cleanup_interval(),
            backoff: config.cleanup_backoff(),
        }
    }

    /// Override the sleep between iterations and after a failure
    pub fn with_intervals(mut self, interval: Duration, backoff: Duration) -> Self {
        self.interval = interval;
        self.backoff = backoff;
        self
    }

    /// Run a single iteration on the current thread
    pub fn run_once(&self) -> StoreResult<RetentionReport> {
        let mut report = RetentionReport {
            count_before: self.store.count()?,
            size_before: self.store.size()?,
            ..Default::default()
        };
        debug!(
            entries = report.count_before,
            bytes = report.size_before,
            "Retention iteration started"
        );

        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(retention)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        report.removed_by_age = self.store.delete_older_than(cutoff)?;
        if report.removed_by_age > 0 {
            info!(count = report.removed_by_age, %cutoff, "Deleted expired records");
        }

        if self.max_entries > 0 {
            report.removed_by_bound = self.store.evict_to_bound(self.max_entries)?;
        }

        if self.store.is_durable()? {
            report.compacted = self.store.compact()?;
        }

        report.count_after = self.store.count()?;
        report.size_after = self.store.size()?;
        info!(
            removed = report.removed(),
            entries_before = report.count_before,
            entries_after = report.count_after,
            bytes_before = report.size_before,
            bytes_after = report.size_after,
            "Retention completed"
        );

        if report.size_after > LARGE_DATABASE_BYTES {
            warn!(bytes = report.size_after, "Telemetry database is getting large");
        }
        Ok(report)
    }

    /// Start the loop on the runtime. The first iteration runs immediately.
    pub fn spawn(self) -> RetentionHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            info!(
                interval_secs = self.interval.as_secs(),
                max_entries = self.max_entries,
                "Retention scheduler started"
            );
            loop {
                let scheduler = self.clone();
                let outcome = tokio::task::spawn_blocking(move || scheduler.run_once()).await;

                let wait = match outcome {
                    Ok(Ok(_)) => self.interval,
                    Ok(Err(e)) => {
                        error!(error = %e, "Retention iteration failed");
                        self.backoff
                    }
                    Err(e) => {
                        error!(error = %e, "Retention iteration aborted");
                        self.backoff
                    }
                };

                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = shutdown_rx.changed() => {
                        // A dropped sender also stops the loop
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Retention scheduler stopped");
        });

        RetentionHandle { shutdown_tx, task }
    }
}

/// Running retention loop
pub struct RetentionHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RetentionHandle {
    /// Signal the loop and wait for it to exit. An iteration in progress
    /// finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Retention task panicked");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Envelope, LogRecord, RecordKind};
    use tempfile::TempDir;

    fn log_at(age: chrono::Duration, message: &str) -> LogRecord {
        let mut log = LogRecord::new("Info", message);
        log.envelope = Envelope::at(Utc::now() - age);
        log
    }

    fn config(max_entries: usize) -> CaptureConfig {
        CaptureConfig {
            max_entries,
            retention_period_secs: 24 * 3600,
            ..CaptureConfig::in_memory()
        }
    }

    #[test]
    fn test_run_once_removes_by_age_then_bound() {
        let store = Arc::new(TelemetryStore::in_memory());
        store.insert(log_at(chrono::Duration::days(3), "expired")).unwrap();
        for i in 0..5 {
            store
                .insert(log_at(chrono::Duration::minutes(10 - i), &format!("log {i}")))
                .unwrap();
        }

        let report = RetentionScheduler::new(Arc::clone(&store), &config(3))
            .run_once()
            .unwrap();

        assert_eq!(report.count_before, 6);
        assert_eq!(report.removed_by_age, 1);
        assert_eq!(report.removed_by_bound, 2);
        assert_eq!(report.count_after, 3);
        assert!(!report.compacted);
        assert_eq!(store.count_of(RecordKind::Log).unwrap(), 3);
    }

    #[test]
    fn test_run_once_compacts_file_store() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(TelemetryStore::open(dir.path().join("t.jsonl")).unwrap());
        for i in 0..4 {
            store.insert(LogRecord::new("Info", format!("log {i}"))).unwrap();
        }

        let report = RetentionScheduler::new(Arc::clone(&store), &config(2))
            .run_once()
            .unwrap();

        assert!(report.compacted);
        assert_eq!(report.removed_by_bound, 2);
        assert!(report.size_after < report.size_before);
    }

    #[test]
    fn test_run_once_on_closed_store_fails() {
        let store = Arc::new(TelemetryStore::in_memory());
        store.close().unwrap();
        assert!(RetentionScheduler::new(store, &config(10)).run_once().is_err());
    }

    #[tokio::test]
    async fn test_spawned_loop_trims_and_stops() {
        let store = Arc::new(TelemetryStore::in_memory());
        for i in 0..10 {
            store.insert(LogRecord::new("Info", format!("log {i}"))).unwrap();
        }

        let handle = RetentionScheduler::new(Arc::clone(&store), &config(4))
            .with_intervals(Duration::from_millis(10), Duration::from_millis(10))
            .spawn();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while store.count().unwrap() > 4 && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.count().unwrap(), 4);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_long_sleep() {
        let store = Arc::new(TelemetryStore::in_memory());
        let handle = RetentionScheduler::new(store, &config(10))
            .with_intervals(Duration::from_secs(3600), Duration::from_secs(3600))
            .spawn();

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .expect("scheduler did not stop");
    }

    #[tokio::test]
    async fn test_failing_iterations_keep_loop_alive() {
        let store = Arc::new(TelemetryStore::in_memory());
        store.close().unwrap();
        let handle = RetentionScheduler::new(store, &config(10))
            .with_intervals(Duration::from_millis(5), Duration::from_millis(5))
            .spawn();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        handle.shutdown().await;
    }
}
