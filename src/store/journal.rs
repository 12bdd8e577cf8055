//! Append-only JSON-lines journal
//!
//! Each line is one operation. Opening a journal replays it; compaction
//! rewrites it with only the live records.
//!
//! Rewrites are atomic:
//! 1. Write to a `.tmp` sibling
//! 2. `sync_all()`
//! 3. Rename over the journal
//!
//! so a crash leaves either the old or the new journal, never a mix.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::StoreResult;
use crate::types::{Record, RecordKind};

/// A replayed journal operation
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum JournalOp {
    Insert { record: Record },
    Delete { kind: RecordKind, ids: Vec<String> },
    Clear,
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum JournalOpRef<'a> {
    Insert { record: &'a Record },
    Delete { kind: RecordKind, ids: &'a [String] },
    Clear,
}

pub(crate) struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes: u64,
}

impl Journal {
    /// Open (creating if needed) and return the operations to replay.
    ///
    /// Unparsable lines are skipped with a warning.
    pub fn open(path: &Path) -> StoreResult<(Self, Vec<JournalOp>)> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut ops = Vec::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for (line_num, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JournalOp>(&line) {
                    Ok(op) => ops.push(op),
                    Err(e) => warn!(
                        path = %path.display(),
                        line = line_num + 1,
                        error = %e,
                        "Skipping unreadable journal line"
                    ),
                }
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let bytes = file.metadata()?.len();
        let journal = Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            bytes,
        };
        Ok((journal, ops))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Journal size on disk
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Append an insert, returning the encoded line length
    pub fn append_insert(&mut self, record: &Record) -> StoreResult<u64> {
        self.append(&JournalOpRef::Insert { record })
    }

    pub fn append_delete(&mut self, kind: RecordKind, ids: &[String]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.append(&JournalOpRef::Delete { kind, ids })
    }

    pub fn append_clear(&mut self) -> StoreResult<u64> {
        self.append(&JournalOpRef::Clear)
    }

    fn append(&mut self, op: &JournalOpRef<'_>) -> StoreResult<u64> {
        let mut line = serde_json::to_vec(op)?;
        line.push(b'\n');
        self.writer.write_all(&line)?;
        self.writer.flush()?;
        let len = line.len() as u64;
        self.bytes += len;
        Ok(len)
    }

    /// Atomically replace the journal with one insert per record
    pub fn rewrite<'a, I>(&mut self, records: I) -> StoreResult<()>
    where
        I: IntoIterator<Item = &'a Record>,
    {
        self.writer.flush()?;

        let temp_path = self.path.with_extension("tmp");
        let mut written = 0u64;
        {
            let mut out = BufWriter::new(File::create(&temp_path)?);
            for record in records {
                let mut line = serde_json::to_vec(&JournalOpRef::Insert { record })?;
                line.push(b'\n');
                out.write_all(&line)?;
                written += line.len() as u64;
            }
            let file = out.into_inner().map_err(io::IntoInnerError::into_error)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.bytes = written;
        Ok(())
    }

    pub fn sync(&mut self) -> StoreResult<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// Encoded size of a record, used for in-memory size accounting
pub(crate) fn encoded_len(record: &Record) -> StoreResult<u64> {
    Ok(serde_json::to_vec(record)?.len() as u64)
}
