//! Header redaction

use std::collections::BTreeMap;

use axum::http::HeaderMap;

/// Copy `headers` minus every name on `denylist` (case-insensitive).
///
/// Repeated headers are joined with `", "`.
pub fn redact_headers(headers: &HeaderMap, denylist: &[String]) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if denylist.iter().any(|d| d.eq_ignore_ascii_case(name)) {
            continue;
        }
        let value = String::from_utf8_lossy(value.as_bytes());
        out.entry(name.to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    out
}
