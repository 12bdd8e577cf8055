//! Command-text correlation token
//!
//! The data-access pipeline reports the start and the end of a command
//! through two unrelated callbacks that share nothing but the command
//! text. On start a token `/*dbg:{record_id}:{start_micros}*/` is appended
//! to the text as an inert comment; on completion the last token in the
//! text is parsed back and removed.
//!
//! Anything that cannot be parsed is treated as "no token".

use chrono::{DateTime, Utc};

const OPEN: &str = "/*dbg:";
const CLOSE: &str = "*/";

/// Data recovered from a command's text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub record_id: String,
    pub started_at: DateTime<Utc>,
}

impl Token {
    pub fn new(record_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            record_id: record_id.into(),
            started_at,
        }
    }

    pub fn render(&self) -> String {
        format!(
            "{OPEN}{}:{}{CLOSE}",
            self.record_id,
            self.started_at.timestamp_micros()
        )
    }

    /// Milliseconds from the token's start to `now`, never negative
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        (now - self.started_at).num_milliseconds().max(0) as u64
    }
}

/// Append `token` to `text`
pub fn embed(text: &str, token: &Token) -> String {
    let mut out = String::with_capacity(text.len() + 64);
    out.push_str(text);
    out.push_str(&token.render());
    out
}

/// Parse the last token in `text` and return it with the text it was
/// removed from.
pub fn extract(text: &str) -> Option<(Token, String)> {
    let start = text.rfind(OPEN)?;
    let body_start = start + OPEN.len();
    let body_len = text[body_start..].find(CLOSE)?;
    let end = body_start + body_len + CLOSE.len();

    let token = parse_body(&text[body_start..body_start + body_len])?;

    let mut stripped = String::with_capacity(text.len() - (end - start));
    stripped.push_str(&text[..start]);
    stripped.push_str(&text[end..]);
    Some((token, stripped))
}

fn parse_body(body: &str) -> Option<Token> {
    let (record_id, micros) = body.rsplit_once(':')?;
    if record_id.is_empty() || record_id.contains(char::is_whitespace) {
        return None;
    }
    let micros: i64 = micros.parse().ok()?;
    let started_at = DateTime::from_timestamp_micros(micros)?;
    Some(Token::new(record_id, started_at))
}
