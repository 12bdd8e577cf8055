//! Capture configuration
//!
//! Values are resolved in three layers: built-in defaults, an optional TOML
//! file, then `REQTRACE_*` environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ConfigError, ConfigResult};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "REQTRACE_";

/// Size above which the retention loop warns about the database
pub const LARGE_DATABASE_BYTES: u64 = 100 * 1024 * 1024;

/// Every knob of the capture layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Master switch. When false nothing is captured or served.
    pub enabled: bool,

    /// Dashboard namespace; always excluded from capture
    pub base_path: String,

    /// Journal file. `None` or `":memory:"` keeps everything in memory.
    pub database_path: Option<String>,

    /// Per-kind record ceiling
    pub max_entries: usize,

    pub log_request_bodies: bool,
    pub log_response_bodies: bool,
    pub log_sql_queries: bool,
    pub log_exceptions: bool,
    pub enable_real_time_updates: bool,

    /// Path prefixes never captured
    pub excluded_paths: Vec<String>,

    /// Header names dropped from captured requests (case-insensitive)
    pub excluded_headers: Vec<String>,

    /// Largest body captured, in bytes
    pub max_body_size: usize,

    pub retention_period_secs: u64,
    pub slow_query_threshold_ms: u64,
    pub slow_request_threshold_ms: u64,
    pub max_stack_trace_depth: usize,
    pub cleanup_interval_secs: u64,
    pub cleanup_backoff_secs: u64,

    pub log_level: String,
    pub log_json: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_path: "/_debug".to_string(),
            database_path: Some("debug-dashboard.jsonl".to_string()),
            max_entries: 1000,
            log_request_bodies: true,
            log_response_bodies: false,
            log_sql_queries: true,
            log_exceptions: true,
            enable_real_time_updates: true,
            excluded_paths: vec![
                "/_debug".to_string(),
                "/favicon.ico".to_string(),
                "/robots.txt".to_string(),
            ],
            excluded_headers: vec!["Authorization".to_string(), "Cookie".to_string()],
            max_body_size: 1024 * 1024,
            retention_period_secs: 7 * 24 * 60 * 60,
            slow_query_threshold_ms: 1000,
            slow_request_threshold_ms: 5000,
            max_stack_trace_depth: 50,
            cleanup_interval_secs: 60 * 60,
            cleanup_backoff_secs: 5 * 60,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl CaptureConfig {
    /// Configuration that keeps everything in memory
    pub fn in_memory() -> Self {
        Self {
            database_path: None,
            ..Default::default()
        }
    }

    /// Defaults, then `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from: {}", path.display());
                Self::from_file(path)?
            }
            None => {
                debug!("No config file given, using defaults");
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `REQTRACE_*` overrides read through `lookup`.
    ///
    /// Unparsable values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        fn parse<T: std::str::FromStr>(name: &str, raw: String, slot: &mut T) {
            match raw.trim().parse() {
                Ok(value) => *slot = value,
                Err(_) => warn!("Ignoring invalid {}{}: {:?}", ENV_PREFIX, name, raw),
            }
        }

        if let Some(v) = get("ENABLED") {
            parse("ENABLED", v, &mut self.enabled);
        }
        if let Some(v) = get("BASE_PATH") {
            self.base_path = v;
        }
        if let Some(v) = get("DATABASE_PATH") {
            self.database_path = if v.is_empty() { None } else { Some(v) };
        }
        if let Some(v) = get("MAX_ENTRIES") {
            parse("MAX_ENTRIES", v, &mut self.max_entries);
        }
        if let Some(v) = get("LOG_REQUEST_BODIES") {
            parse("LOG_REQUEST_BODIES", v, &mut self.log_request_bodies);
        }
        if let Some(v) = get("LOG_RESPONSE_BODIES") {
            parse("LOG_RESPONSE_BODIES", v, &mut self.log_response_bodies);
        }
        if let Some(v) = get("LOG_SQL_QUERIES") {
            parse("LOG_SQL_QUERIES", v, &mut self.log_sql_queries);
        }
        if let Some(v) = get("LOG_EXCEPTIONS") {
            parse("LOG_EXCEPTIONS", v, &mut self.log_exceptions);
        }
        if let Some(v) = get("ENABLE_REAL_TIME_UPDATES") {
            parse("ENABLE_REAL_TIME_UPDATES", v, &mut self.enable_real_time_updates);
        }
        if let Some(v) = get("EXCLUDED_PATHS") {
            self.excluded_paths = split_list(&v);
        }
        if let Some(v) = get("EXCLUDED_HEADERS") {
            self.excluded_headers = split_list(&v);
        }
        if let Some(v) = get("MAX_BODY_SIZE") {
            parse("MAX_BODY_SIZE", v, &mut self.max_body_size);
        }
        if let Some(v) = get("RETENTION_PERIOD_SECS") {
            parse("RETENTION_PERIOD_SECS", v, &mut self.retention_period_secs);
        }
        if let Some(v) = get("SLOW_QUERY_THRESHOLD_MS") {
            parse("SLOW_QUERY_THRESHOLD_MS", v, &mut self.slow_query_threshold_ms);
        }
        if let Some(v) = get("SLOW_REQUEST_THRESHOLD_MS") {
            parse("SLOW_REQUEST_THRESHOLD_MS", v, &mut self.slow_request_threshold_ms);
        }
        if let Some(v) = get("MAX_STACK_TRACE_DEPTH") {
            parse("MAX_STACK_TRACE_DEPTH", v, &mut self.max_stack_trace_depth);
        }
        if let Some(v) = get("CLEANUP_INTERVAL_SECS") {
            parse("CLEANUP_INTERVAL_SECS", v, &mut self.cleanup_interval_secs);
        }
        if let Some(v) = get("CLEANUP_BACKOFF_SECS") {
            parse("CLEANUP_BACKOFF_SECS", v, &mut self.cleanup_backoff_secs);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("LOG_JSON") {
            parse("LOG_JSON", v, &mut self.log_json);
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !self.base_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "base_path must start with '/': {}",
                self.base_path
            )));
        }
        if self.max_entries == 0 {
            return Err(ConfigError::Invalid("max_entries must be positive".to_string()));
        }
        if self.max_body_size == 0 {
            return Err(ConfigError::Invalid("max_body_size must be positive".to_string()));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "cleanup_interval_secs must be positive".to_string(),
            ));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.log_level, valid_levels
            )));
        }
        Ok(())
    }

    /// Journal path, or `None` for an in-memory store
    pub fn journal_path(&self) -> Option<&Path> {
        match self.database_path.as_deref() {
            None | Some("") | Some(":memory:") => None,
            Some(path) => Some(Path::new(path)),
        }
    }

    pub fn retention_period(&self) -> Duration {
        Duration::from_secs(self.retention_period_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn cleanup_backoff(&self) -> Duration {
        Duration::from_secs(self.cleanup_backoff_secs)
    }

    /// Whether `header` is on the redaction denylist
    pub fn is_excluded_header(&self, header: &str) -> bool {
        self.excluded_headers
            .iter()
            .any(|h| h.eq_ignore_ascii_case(header))
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            enabled: self.enabled,
            base_path: self.base_path.clone(),
            durable: self.journal_path().is_some(),
            max_entries: self.max_entries,
            log_request_bodies: self.log_request_bodies,
            log_response_bodies: self.log_response_bodies,
            log_sql_queries: self.log_sql_queries,
            log_exceptions: self.log_exceptions,
            enable_real_time_updates: self.enable_real_time_updates,
            max_body_size: self.max_body_size,
            retention_period_secs: self.retention_period_secs,
            slow_query_threshold_ms: self.slow_query_threshold_ms,
            slow_request_threshold_ms: self.slow_request_threshold_ms,
            excluded_paths: self.excluded_paths.clone(),
            excluded_headers: self.excluded_headers.clone(),
        }
    }
}

/// Read-only view of the configuration for the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    pub enabled: bool,
    pub base_path: String,
    pub durable: bool,
    pub max_entries: usize,
    pub log_request_bodies: bool,
    pub log_response_bodies: bool,
    pub log_sql_queries: bool,
    pub log_exceptions: bool,
    pub enable_real_time_updates: bool,
    pub max_body_size: usize,
    pub retention_period_secs: u64,
    pub slow_query_threshold_ms: u64,
    pub slow_request_threshold_ms: u64,
    pub excluded_paths: Vec<String>,
    pub excluded_headers: Vec<String>,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = CaptureConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_body_size, 1_048_576);
        assert_eq!(config.retention_period(), Duration::from_secs(604_800));
        assert!(config.is_excluded_header("authorization"));
        assert!(!config.is_excluded_header("Accept"));
    }

    #[test]
    fn test_toml_fills_missing_fields_with_defaults() {
        let config: CaptureConfig = toml::from_str(
            r#"
            max_entries = 250
            database_path = ":memory:"
            excluded_headers = ["X-Api-Key"]
            "#,
        )
        .unwrap();

        assert_eq!(config.max_entries, 250);
        assert!(config.journal_path().is_none());
        assert_eq!(config.excluded_headers, vec!["X-Api-Key"]);
        assert_eq!(config.base_path, "/_debug");
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("REQTRACE_ENABLED", "false"),
            ("REQTRACE_MAX_ENTRIES", "not-a-number"),
            ("REQTRACE_EXCLUDED_PATHS", "/health, /metrics ,"),
            ("REQTRACE_DATABASE_PATH", ""),
        ]
        .into_iter()
        .collect();

        let mut config = CaptureConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert!(!config.enabled);
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.excluded_paths, vec!["/health", "/metrics"]);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_validate_rejects_nonsense() {
        let config = CaptureConfig {
            base_path: "debug".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = CaptureConfig {
            max_entries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reqtrace.toml");
        std::fs::write(&path, "slow_request_threshold_ms = 250\n").unwrap();

        let config = CaptureConfig::from_file(&path).unwrap();
        assert_eq!(config.slow_request_threshold_ms, 250);

        let missing = CaptureConfig::from_file(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
