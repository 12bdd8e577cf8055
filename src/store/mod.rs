//! Embedded telemetry storage
//!
//! - `collection`: per-kind records with time, request and category indexes
//! - `journal`: JSON-lines persistence with atomic compaction
//! - `query`: filter, sort and pagination
//! - `stats`: aggregates and percentiles
//! - `engine`: [`TelemetryStore`], the public face of all of the above

mod collection;
mod engine;
mod journal;
mod query;
pub mod stats;

pub use engine::TelemetryStore;
pub use stats::{median, percentile};
