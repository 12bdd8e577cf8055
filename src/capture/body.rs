//! Body capture without consuming the stream
//!
//! Up to `limit` bytes are read from the body; the bytes read are then
//! replayed in front of whatever is left, so the consumer sees exactly
//! the original byte stream (including a read error, at the same point).

use axum::body::{Body, Bytes};
use futures::{stream, StreamExt};

/// What was captured from a body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    /// Whole body, decoded lossily as UTF-8
    Text { text: String, bytes: u64 },
    /// Body exceeded the limit; `bytes` is the declared size if known
    TooLarge { bytes: Option<u64>, limit: usize },
    /// Reading failed part way
    Failed { error: String, bytes_read: u64 },
}

impl Captured {
    /// Text stored on the record
    pub fn into_text(self) -> String {
        match self {
            Captured::Text { text, .. } => text,
            Captured::TooLarge { bytes: Some(n), limit } => {
                format!("[Body too large: {n} bytes, limit {limit} bytes]")
            }
            Captured::TooLarge { bytes: None, limit } => {
                format!("[Body too large: more than {limit} bytes]")
            }
            Captured::Failed { error, .. } => format!("[Failed to read body: {error}]"),
        }
    }

    /// Size known from capture, if any
    pub fn size(&self) -> Option<u64> {
        match self {
            Captured::Text { bytes, .. } => Some(*bytes),
            Captured::TooLarge { bytes, .. } => *bytes,
            Captured::Failed { .. } => None,
        }
    }
}

/// Read up to `limit` bytes of `body` and return a replayable body plus
/// the capture. A declared length above `limit` skips reading entirely.
pub async fn tee(body: Body, declared_len: Option<u64>, limit: usize) -> (Body, Captured) {
    if let Some(len) = declared_len {
        if len > limit as u64 {
            return (
                body,
                Captured::TooLarge {
                    bytes: Some(len),
                    limit,
                },
            );
        }
    }

    let mut rest = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut read = 0usize;

    loop {
        match rest.next().await {
            None => {
                let mut buf = Vec::with_capacity(read);
                for chunk in &chunks {
                    buf.extend_from_slice(chunk);
                }
                let text = String::from_utf8_lossy(&buf).into_owned();
                let captured = Captured::Text {
                    text,
                    bytes: read as u64,
                };
                let body = if chunks.is_empty() {
                    Body::empty()
                } else {
                    Body::from(Bytes::from(buf))
                };
                return (body, captured);
            }
            Some(Ok(chunk)) => {
                read += chunk.len();
                chunks.push(chunk);
                if read > limit {
                    let captured = Captured::TooLarge { bytes: None, limit };
                    let replay = stream::iter(chunks.into_iter().map(Ok)).chain(rest);
                    return (Body::from_stream(replay), captured);
                }
            }
            Some(Err(error)) => {
                let captured = Captured::Failed {
                    error: error.to_string(),
                    bytes_read: read as u64,
                };
                let replay = stream::iter(chunks.into_iter().map(Ok))
                    .chain(stream::once(async move { Err(error) }))
                    .chain(rest);
                return (Body::from_stream(replay), captured);
            }
        }
    }
}
