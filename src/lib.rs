//! reqtrace
//!
//! In-process request telemetry for axum services. A middleware observes
//! every request, nested data-access commands and log statements are
//! correlated back to the request that caused them, and the assembled
//! records land in an embedded store with a filterable, paginated query
//! surface and a small dashboard API.
//!
//! # Modules
//!
//! - `types`: Record kinds (request, query, log, fault), filters, stats
//! - `correlation`: Per-request buffer and the command-text token protocol
//! - `capture`: Middleware, body tee, redaction, fault and log capture
//! - `store`: Indexed in-memory image with an optional JSON-lines journal
//! - `retention`: Background eviction by age and by count
//! - `notify`: Push notifications for dashboard clients
//! - `api`: REST and WebSocket dashboard endpoints
//! - `config`: Layered configuration (defaults, TOML, environment)
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use axum::{middleware, routing::get, Router};
//! use reqtrace::{capture_requests, create_router, Capture, CaptureConfig, TelemetryStore};
//!
//! # fn build() -> Result<Router, Box<dyn std::error::Error>> {
//! let config = CaptureConfig::load(None)?;
//! let store = Arc::new(TelemetryStore::from_config(&config)?);
//! let capture = Capture::new(config, store);
//!
//! let app = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(middleware::from_fn_with_state(capture.clone(), capture_requests))
//!     .merge(create_router(capture));
//! # Ok(app)
//! # }
//! ```

pub mod api;
pub mod capture;
pub mod config;
pub mod correlation;
pub mod error;
pub mod notify;
pub mod retention;
pub mod store;
pub mod types;

// Re-export commonly used items at crate root
pub use api::create_router;
pub use capture::{capture_requests, Capture, DebugLogger, ReportedFault, RequestId};
pub use config::CaptureConfig;
pub use correlation::{Command, CommandInterceptor, CorrelationBuffer, DataCommand};
pub use error::{ConfigError, StoreError, StoreResult};
pub use notify::{BroadcastNotifier, DashboardEvent, Notifier, NoopNotifier};
pub use retention::{RetentionHandle, RetentionReport, RetentionScheduler};
pub use store::TelemetryStore;
pub use types::{
    FaultRecord, Filter, LogRecord, PagedResult, Record, RecordKind, RequestRecord,
    SqlQueryRecord, StatsSnapshot,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
