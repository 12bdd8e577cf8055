//! Data-access command instrumentation

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::trace;

use super::token::{self, Token};
use super::CorrelationBuffer;
use crate::capture::Recorder;
use crate::types::{new_record_id, Envelope, SqlQueryRecord};

/// What the host's command object must expose
pub trait DataCommand {
    fn command_text(&self) -> &str;

    fn set_command_text(&mut self, text: String);

    /// Parameter name and value; null values are `Value::Null`
    fn parameters(&self) -> Vec<(String, Value)> {
        Vec::new()
    }

    fn connection_string(&self) -> Option<&str> {
        None
    }

    fn database(&self) -> Option<&str> {
        None
    }

    fn command_type(&self) -> Option<&str> {
        None
    }
}

/// Plain command for hosts without their own command type
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub text: String,
    pub parameters: Vec<(String, Value)>,
    pub connection_string: Option<String>,
    pub database: Option<String>,
    pub command_type: Option<String>,
}

impl Command {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Value) -> Self {
        self.parameters.push((name.into(), value));
        self
    }

    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection_string = Some(connection.into());
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl DataCommand for Command {
    fn command_text(&self) -> &str {
        &self.text
    }

    fn set_command_text(&mut self, text: String) {
        self.text = text;
    }

    fn parameters(&self) -> Vec<(String, Value)> {
        self.parameters.clone()
    }

    fn connection_string(&self) -> Option<&str> {
        self.connection_string.as_deref()
    }

    fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    fn command_type(&self) -> Option<&str> {
        self.command_type.as_deref()
    }
}

enum Outcome<'a> {
    Executed { rows_affected: i64 },
    Failed { error: &'a str },
}

/// Pairs the "executing" and "executed/failed" callbacks of a command.
///
/// Only `executing` learns the owning request; the completion callbacks
/// recover everything else from the token left in the command text.
pub struct CommandInterceptor {
    buffer: Arc<CorrelationBuffer>,
    recorder: Arc<Recorder>,
    enabled: bool,
    slow_query_threshold_ms: u64,
}

impl CommandInterceptor {
    pub fn new(
        buffer: Arc<CorrelationBuffer>,
        recorder: Arc<Recorder>,
        slow_query_threshold_ms: u64,
    ) -> Self {
        Self {
            buffer,
            recorder,
            enabled: true,
            slow_query_threshold_ms,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// The command is about to run.
    ///
    /// Tags the command text and buffers a provisional record under
    /// `request_id` when one is in flight.
    pub fn executing<C: DataCommand + ?Sized>(&self, command: &mut C, request_id: Option<&str>) {
        self.executing_at(command, request_id, Utc::now());
    }

    pub fn executing_at<C: DataCommand + ?Sized>(
        &self,
        command: &mut C,
        request_id: Option<&str>,
        now: DateTime<Utc>,
    ) {
        if !self.enabled {
            return;
        }

        let token = Token::new(new_record_id(), now);
        let mut provisional = self.snapshot(command, &token);
        if let Some(request_id) = request_id.filter(|id| !id.is_empty()) {
            provisional.envelope.request_id = request_id.to_string();
            self.buffer.attach_query(request_id, provisional);
        }

        let tagged = token::embed(command.command_text(), &token);
        command.set_command_text(tagged);
    }

    /// The command finished. Returns the persisted record, or `None` when
    /// the command carries no usable token.
    pub fn executed<C: DataCommand + ?Sized>(
        &self,
        command: &mut C,
        rows_affected: i64,
    ) -> Option<SqlQueryRecord> {
        self.complete(command, Outcome::Executed { rows_affected }, Utc::now())
    }

    pub fn executed_at<C: DataCommand + ?Sized>(
        &self,
        command: &mut C,
        rows_affected: i64,
        now: DateTime<Utc>,
    ) -> Option<SqlQueryRecord> {
        self.complete(command, Outcome::Executed { rows_affected }, now)
    }

    /// The command failed with `error`
    pub fn failed<C: DataCommand + ?Sized>(
        &self,
        command: &mut C,
        error: &str,
    ) -> Option<SqlQueryRecord> {
        self.complete(command, Outcome::Failed { error }, Utc::now())
    }

    fn complete<C: DataCommand + ?Sized>(
        &self,
        command: &mut C,
        outcome: Outcome<'_>,
        now: DateTime<Utc>,
    ) -> Option<SqlQueryRecord> {
        if !self.enabled {
            return None;
        }

        let Some((token, original)) = token::extract(command.command_text()) else {
            trace!("Completion without correlation token dropped");
            return None;
        };
        command.set_command_text(original);

        let mut record = self.snapshot(command, &token);
        if let Some(owner) = self.buffer.owner_of_query(&token.record_id) {
            record.envelope.request_id = owner;
        }
        record.execution_time_ms = token.elapsed_ms(now);
        record.is_slow_query = record.execution_time_ms > self.slow_query_threshold_ms;
        match outcome {
            Outcome::Executed { rows_affected } => {
                record.rows_affected = rows_affected;
                record.is_successful = true;
            }
            Outcome::Failed { error } => {
                record.is_successful = false;
                record.error = Some(error.to_string());
            }
        }

        self.buffer.resolve_query(&record);
        self.recorder.record_query(record.clone());
        Some(record)
    }

    fn snapshot<C: DataCommand + ?Sized>(&self, command: &C, token: &Token) -> SqlQueryRecord {
        let mut record = SqlQueryRecord {
            envelope: Envelope::with_id(token.record_id.clone(), token.started_at),
            query: command.command_text().to_string(),
            parameters: BTreeMap::new(),
            connection: command.connection_string().map(sanitize_connection),
            database: command.database().map(String::from),
            command_type: command.command_type().map(String::from),
            ..Default::default()
        };
        for (name, value) in command.parameters() {
            record.set_parameter(name, value);
        }
        record
    }
}

/// Mask the value of every `key=value` segment whose key names a secret
pub fn sanitize_connection(connection: &str) -> String {
    connection
        .split(';')
        .map(|segment| match segment.split_once('=') {
            Some((key, _)) if is_secret_key(key) => format!("{key}=***"),
            _ => segment.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ["password", "pwd", "secret"]
        .iter()
        .any(|needle| key.contains(needle))
}
