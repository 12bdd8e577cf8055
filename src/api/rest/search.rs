//! Free-text search across record kinds

use axum::{
    extract::{Query, State},
    response::Response,
};
use serde::Deserialize;

use super::{bad_request, ok, store_error};
use crate::capture::Capture;
use crate::types::{RecordKind, MAX_PAGE_SIZE};

const DEFAULT_MAX_RESULTS: usize = 50;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchParams {
    pub term: Option<String>,
    /// Comma-separated kind names; all kinds when absent
    pub types: Option<String>,
    pub max_results: Option<usize>,
}

impl SearchParams {
    fn kinds(&self) -> Result<Vec<RecordKind>, String> {
        let Some(types) = self.types.as_deref() else {
            return Ok(Vec::new());
        };
        let mut kinds = Vec::new();
        for name in types.split(',').filter(|n| !n.trim().is_empty()) {
            let kind = RecordKind::parse(name)
                .ok_or_else(|| format!("unknown type '{}'", name.trim()))?;
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }
}

/// GET /api/search
pub async fn search(State(capture): State<Capture>, Query(params): Query<SearchParams>) -> Response {
    let term = params.term.as_deref().map(str::trim).unwrap_or_default();
    if term.is_empty() {
        return bad_request("search term is required");
    }
    let kinds = match params.kinds() {
        Ok(kinds) => kinds,
        Err(message) => return bad_request(message),
    };
    let max_results = params
        .max_results
        .unwrap_or(DEFAULT_MAX_RESULTS)
        .clamp(1, MAX_PAGE_SIZE);

    match capture.store().search(term, &kinds, max_results) {
        Ok(records) => ok(&capture, records),
        Err(e) => store_error(e),
    }
}
