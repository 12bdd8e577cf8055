//! Error types

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the telemetry store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("journal corrupted: {0}")]
    Corrupted(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
