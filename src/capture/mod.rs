//! Request capture
//!
//! [`Capture`] bundles everything the capture path needs. The host wires
//! it in as axum middleware via [`capture_requests`] and hands
//! [`Capture::interceptor`] and [`Capture::logger`] to its data-access and
//! logging code, passing the [`RequestId`] found in request extensions.

mod body;
mod fault;
mod logger;
mod middleware;
mod recorder;
mod redact;

pub use body::{tee, Captured};
pub use fault::{chain_from_error, from_panic, truncate_stack, ReportedFault, PANIC_FAULT_TYPE};
pub use logger::DebugLogger;
pub use middleware::{capture_requests, RequestId, CANCELLED_STATUS, REQUEST_ID_HEADER};
pub use recorder::Recorder;
pub use redact::redact_headers;

use std::sync::Arc;

use crate::config::CaptureConfig;
use crate::correlation::{CommandInterceptor, CorrelationBuffer};
use crate::notify::{BroadcastNotifier, Notifier, NoopNotifier};
use crate::store::TelemetryStore;

/// File extensions never captured
const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "png", "jpg", "jpeg", "gif", "ico", "svg", "woff", "woff2", "ttf", "map",
];

/// Shared capture state; cheap to clone
#[derive(Clone)]
pub struct Capture {
    config: Arc<CaptureConfig>,
    buffer: Arc<CorrelationBuffer>,
    recorder: Arc<Recorder>,
    interceptor: Arc<CommandInterceptor>,
    logger: DebugLogger,
    broadcaster: Option<Arc<BroadcastNotifier>>,
}

impl Capture {
    /// Wire up capture over `store`. A broadcast notifier is created when
    /// real-time updates are enabled.
    pub fn new(config: CaptureConfig, store: Arc<TelemetryStore>) -> Self {
        let broadcaster = config
            .enable_real_time_updates
            .then(|| Arc::new(BroadcastNotifier::default()));
        let notifier: Arc<dyn Notifier> = match &broadcaster {
            Some(b) => Arc::clone(b) as Arc<dyn Notifier>,
            None => Arc::new(NoopNotifier),
        };

        let buffer = Arc::new(CorrelationBuffer::new());
        let recorder = Arc::new(Recorder::new(store, notifier));
        let interceptor = Arc::new(
            CommandInterceptor::new(
                Arc::clone(&buffer),
                Arc::clone(&recorder),
                config.slow_query_threshold_ms,
            )
            .with_enabled(config.enabled && config.log_sql_queries),
        );
        let logger = DebugLogger::new(Arc::clone(&buffer), Arc::clone(&recorder))
            .with_enabled(config.enabled);

        Self {
            config: Arc::new(config),
            buffer,
            recorder,
            interceptor,
            logger,
            broadcaster,
        }
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn buffer(&self) -> &Arc<CorrelationBuffer> {
        &self.buffer
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn store(&self) -> &Arc<TelemetryStore> {
        self.recorder.store()
    }

    pub fn interceptor(&self) -> &Arc<CommandInterceptor> {
        &self.interceptor
    }

    pub fn logger(&self) -> &DebugLogger {
        &self.logger
    }

    /// Present when real-time updates are enabled
    pub fn broadcaster(&self) -> Option<&Arc<BroadcastNotifier>> {
        self.broadcaster.as_ref()
    }

    /// Whether `path` skips capture entirely
    pub fn is_excluded(&self, path: &str) -> bool {
        if under(path, &self.config.base_path) {
            return true;
        }
        if self.config.excluded_paths.iter().any(|p| under(path, p)) {
            return true;
        }
        let last = path.rsplit('/').next().unwrap_or(path);
        match last.rsplit_once('.') {
            Some((_, ext)) => STATIC_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext)),
            None => false,
        }
    }
}

/// `path` equals `prefix` or lies below it, ignoring ASCII case
fn under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return false;
    }
    match path.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => {
            matches!(path.as_bytes().get(prefix.len()), None | Some(b'/'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capture() -> Capture {
        let config = CaptureConfig {
            excluded_paths: vec!["/health".to_string(), "/favicon.ico".to_string()],
            ..CaptureConfig::in_memory()
        };
        Capture::new(config, Arc::new(TelemetryStore::in_memory()))
    }

    #[test]
    fn test_exclusions() {
        let c = capture();
        assert!(c.is_excluded("/_debug"));
        assert!(c.is_excluded("/_DEBUG/api/requests"));
        assert!(c.is_excluded("/health/live"));
        assert!(c.is_excluded("/favicon.ico"));
        assert!(c.is_excluded("/assets/site.CSS"));
        assert!(c.is_excluded("/bundle.js"));

        assert!(!c.is_excluded("/healthz"));
        assert!(!c.is_excluded("/_debugger"));
        assert!(!c.is_excluded("/api/users"));
        assert!(!c.is_excluded("/api/v1.2/users"));
    }

    #[test]
    fn test_real_time_updates_toggle_broadcaster() {
        assert!(capture().broadcaster().is_some());
        let quiet = Capture::new(
            CaptureConfig {
                enable_real_time_updates: false,
                ..CaptureConfig::in_memory()
            },
            Arc::new(TelemetryStore::in_memory()),
        );
        assert!(quiet.broadcaster().is_none());
    }
}
