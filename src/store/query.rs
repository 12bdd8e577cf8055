//! Filtered, sorted and paged retrieval
//!
//! Evaluation order: narrow candidates through an index (request id,
//! categorical field, or the timestamp range), apply every predicate,
//! count, sort, then slice the requested page.
//!
//! All text predicates compare case-insensitively.

use std::cmp::Ordering;

use rayon::prelude::*;

use crate::types::{Filter, PagedResult, Record, RecordKind, SortField};

use super::collection::{Collection, Stored};

/// Candidate count above which predicates run in parallel
const PARALLEL_FILTER_THRESHOLD: usize = 1000;

/// Compiled predicates with lower-cased needles
struct Predicate<'f> {
    filter: &'f Filter,
    search: Option<String>,
    method: Option<String>,
    path: Option<String>,
    level: Option<String>,
    tag: Option<String>,
    category: Option<String>,
    fault_type: Option<String>,
}

impl<'f> Predicate<'f> {
    fn new(filter: &'f Filter) -> Self {
        let lower = |s: &Option<String>| s.as_ref().map(|s| s.to_lowercase());
        Self {
            filter,
            search: lower(&filter.search),
            method: lower(&filter.method),
            path: lower(&filter.path),
            level: lower(&filter.level),
            tag: lower(&filter.tag),
            category: lower(&filter.category),
            fault_type: lower(&filter.fault_type),
        }
    }

    fn matches(&self, stored: &Stored) -> bool {
        let f = self.filter;
        let envelope = stored.record.envelope();
        let ts = stored.timestamp();
        if f.date_from.map_or(false, |from| ts < from) || f.date_to.map_or(false, |to| ts > to) {
            return false;
        }
        if let Some(request_id) = &f.request_id {
            if &envelope.request_id != request_id {
                return false;
            }
        }

        match &stored.record {
            Record::Request(r) => {
                eq(&self.method, &r.method)
                    && contains(&self.path, &r.path)
                    && f.status_code.map_or(true, |code| r.status_code == code)
                    && in_range(f, r.execution_time_ms)
                    && f.is_slow.map_or(true, |slow| r.is_slow == slow)
                    && self.search.as_deref().map_or(true, |needle| {
                        has(&r.path, needle)
                            || has(&r.query_string, needle)
                            || has(&r.method, needle)
                            || r.request_body.as_deref().map_or(false, |b| has(b, needle))
                    })
            }
            Record::Query(q) => {
                in_range(f, q.execution_time_ms)
                    && f.is_successful.map_or(true, |ok| q.is_successful == ok)
                    && f.is_slow.map_or(true, |slow| q.is_slow_query == slow)
                    && self.search.as_deref().map_or(true, |needle| {
                        has(&q.query, needle)
                            || q.error.as_deref().map_or(false, |e| has(e, needle))
                    })
            }
            Record::Log(l) => {
                eq(&self.level, &l.level)
                    && opt_eq(&self.tag, l.tag.as_deref())
                    && opt_eq(&self.category, l.category.as_deref())
                    && self.search.as_deref().map_or(true, |needle| {
                        has(&l.message, needle)
                            || l.tag.as_deref().map_or(false, |t| has(t, needle))
                            || l.category.as_deref().map_or(false, |c| has(c, needle))
                    })
            }
            Record::Fault(x) => {
                eq(&self.fault_type, &x.fault_type)
                    && opt_eq(&self.method, x.method.as_deref())
                    && self
                        .path
                        .as_deref()
                        .map_or(true, |needle| x.path.as_deref().map_or(false, |p| has(p, needle)))
                    && self.search.as_deref().map_or(true, |needle| {
                        has(&x.message, needle)
                            || has(&x.fault_type, needle)
                            || x.stack_trace.as_deref().map_or(false, |s| has(s, needle))
                    })
            }
        }
    }
}

fn has(haystack: &str, lower_needle: &str) -> bool {
    haystack.to_lowercase().contains(lower_needle)
}

fn eq(needle: &Option<String>, value: &str) -> bool {
    needle.as_deref().map_or(true, |n| value.to_lowercase() == n)
}

fn opt_eq(needle: &Option<String>, value: Option<&str>) -> bool {
    match needle.as_deref() {
        None => true,
        Some(n) => value.map_or(false, |v| v.to_lowercase() == n),
    }
}

fn contains(needle: &Option<String>, value: &str) -> bool {
    needle.as_deref().map_or(true, |n| has(value, n))
}

fn in_range(f: &Filter, ms: u64) -> bool {
    f.min_execution_time.map_or(true, |min| ms >= min)
        && f.max_execution_time.map_or(true, |max| ms <= max)
}

/// Narrow the scan through the most selective available index
fn candidates<'c>(collection: &'c Collection, filter: &Filter) -> Vec<&'c Stored> {
    let indexed = match (&filter.request_id, filter_category(collection, filter)) {
        (Some(request_id), _) => Some(collection.ids_for_request(request_id)),
        (None, Some(category)) => Some(collection.ids_for_category(&category)),
        (None, None) => None,
    };

    match indexed {
        Some(Some(ids)) => ids.iter().filter_map(|id| collection.get(id)).collect(),
        Some(None) => Vec::new(),
        None => collection.range(filter.date_from, filter.date_to),
    }
}

fn filter_category(collection: &Collection, filter: &Filter) -> Option<String> {
    match collection.kind() {
        RecordKind::Request => filter.method.clone(),
        RecordKind::Log => filter.level.clone(),
        RecordKind::Fault => filter.fault_type.clone(),
        RecordKind::Query => None,
    }
}

/// Run `filter` (already normalized) against `collection`
pub(crate) fn run(collection: &Collection, filter: &Filter) -> PagedResult<Record> {
    let predicate = Predicate::new(filter);
    let candidates = candidates(collection, filter);

    let mut matched: Vec<&Stored> = if candidates.len() > PARALLEL_FILTER_THRESHOLD {
        candidates
            .into_par_iter()
            .filter(|s| predicate.matches(s))
            .collect()
    } else {
        candidates
            .into_iter()
            .filter(|s| predicate.matches(s))
            .collect()
    };

    let total = matched.len();
    let field = filter.sort_field();
    let descending = filter.sort_descending;
    matched.sort_by(|a, b| compare(&a.record, &b.record, field, descending));

    let items = matched
        .into_iter()
        .skip(filter.offset())
        .take(filter.page_size)
        .map(|s| s.record.clone())
        .collect();

    PagedResult::new(items, total, filter.page, filter.page_size)
}

/// Free-text match across several collections, newest first, at most
/// `max_results` records
pub(crate) fn search<'c>(
    collections: impl IntoIterator<Item = &'c Collection>,
    term: &str,
    max_results: usize,
) -> Vec<Record> {
    let filter = Filter {
        search: Some(term.to_string()),
        ..Filter::default()
    }
    .normalized();
    if filter.search.is_none() || max_results == 0 {
        return Vec::new();
    }
    let predicate = Predicate::new(&filter);

    let mut matched: Vec<&Stored> = collections
        .into_iter()
        .flat_map(|c| {
            // Newest first, so each collection contributes at most the cap
            c.iter_by_time()
                .rev()
                .filter(|s| predicate.matches(s))
                .take(max_results)
        })
        .collect();
    matched.sort_by(|a, b| compare(&a.record, &b.record, SortField::Timestamp, true));
    matched.truncate(max_results);
    matched.into_iter().map(|s| s.record.clone()).collect()
}

/// Primary key per `field`, then newest first, then id
pub(crate) fn compare(a: &Record, b: &Record, field: SortField, descending: bool) -> Ordering {
    let primary = match field {
        SortField::Timestamp => a.envelope().timestamp().cmp(&b.envelope().timestamp()),
        SortField::ExecutionTimeMs => match (a.execution_time_ms(), b.execution_time_ms()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => a.envelope().timestamp().cmp(&b.envelope().timestamp()),
        },
        SortField::StatusCode => match (a.as_request(), b.as_request()) {
            (Some(x), Some(y)) => x.status_code.cmp(&y.status_code),
            _ => a.envelope().timestamp().cmp(&b.envelope().timestamp()),
        },
        _ => match (text_key(a, field), text_key(b, field)) {
            (Some(x), Some(y)) => x.to_lowercase().cmp(&y.to_lowercase()),
            _ => a.envelope().timestamp().cmp(&b.envelope().timestamp()),
        },
    };
    let primary = if descending { primary.reverse() } else { primary };

    primary
        .then_with(|| b.envelope().timestamp().cmp(&a.envelope().timestamp()))
        .then_with(|| a.id().cmp(b.id()))
}

fn text_key(record: &Record, field: SortField) -> Option<&str> {
    match (field, record) {
        (SortField::Method, Record::Request(r)) => Some(&r.method),
        (SortField::Method, Record::Fault(f)) => Some(f.method.as_deref().unwrap_or("")),
        (SortField::Path, Record::Request(r)) => Some(&r.path),
        (SortField::Path, Record::Fault(f)) => Some(f.path.as_deref().unwrap_or("")),
        (SortField::Level, Record::Log(l)) => Some(&l.level),
        (SortField::Message, Record::Log(l)) => Some(&l.message),
        (SortField::Message, Record::Fault(f)) => Some(&f.message),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Envelope, LogRecord, RequestRecord};
    use chrono::{Duration, Utc};

    fn requests(n: i64) -> Collection {
        let base = Utc::now() - Duration::hours(1);
        let mut c = Collection::new(RecordKind::Request);
        for i in 0..n {
            let method = if i % 2 == 0 { "GET" } else { "POST" };
            let mut r = RequestRecord::new(method, format!("/api/items/{i}"));
            r.envelope = Envelope::at(base + Duration::seconds(i));
            r.status_code = if i % 3 == 0 { 500 } else { 200 };
            r.execution_time_ms = (i as u64) * 10;
            c.insert(r.into(), 1);
        }
        c
    }

    fn paths(page: &PagedResult<Record>) -> Vec<String> {
        page.items
            .iter()
            .map(|r| r.as_request().unwrap().path.clone())
            .collect()
    }

    #[test]
    fn test_method_filter_is_case_insensitive() {
        let c = requests(10);
        let mut filter = Filter::default();
        filter.method = Some("get".to_string());
        let page = run(&c, &filter.normalized());
        assert_eq!(page.total_count, 5);
        assert!(page.items.iter().all(|r| r.as_request().unwrap().method == "GET"));
    }

    #[test]
    fn test_sort_by_execution_time_ascending() {
        let c = requests(6);
        let filter = Filter::page(1, 3)
            .sorted_by("executionTimeMs", false)
            .normalized();
        let page = run(&c, &filter);
        assert_eq!(paths(&page), vec!["/api/items/0", "/api/items/1", "/api/items/2"]);
        assert_eq!(page.total_pages, 2);
    }

    #[test]
    fn test_combined_predicates() {
        let c = requests(12);
        let mut filter = Filter::default();
        filter.status_code = Some(500);
        filter.path = Some("ITEMS/".to_string());
        filter.min_execution_time = Some(30);
        let page = run(&c, &filter.normalized());
        // 3, 6, 9
        assert_eq!(page.total_count, 3);
    }

    #[test]
    fn test_ties_break_newest_first() {
        let mut c = Collection::new(RecordKind::Log);
        let base = Utc::now();
        for i in 0..3 {
            let mut log = LogRecord::new("Info", "same");
            log.envelope = Envelope::at(base + Duration::seconds(i));
            c.insert(log.into(), 1);
        }
        let page = run(&c, &Filter::default().sorted_by("message", false).normalized());
        let times: Vec<_> = page.items.iter().map(|r| r.envelope().timestamp()).collect();
        assert!(times.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_unknown_category_yields_nothing() {
        let c = requests(4);
        let mut filter = Filter::default();
        filter.method = Some("PATCH".to_string());
        let page = run(&c, &filter.normalized());
        assert_eq!(page.total_count, 0);
        assert_eq!(page.total_pages, 0);
    }

    #[test]
    fn test_search_spans_collections_newest_first() {
        let c = requests(5);
        let mut logs = Collection::new(RecordKind::Log);
        let mut log = LogRecord::new("Info", "fetched ITEMS from cache");
        log.envelope = Envelope::at(Utc::now());
        logs.insert(log.into(), 1);
        logs.insert(LogRecord::new("Info", "unrelated").into(), 1);

        let found = search([&c, &logs], "items", 100);
        assert_eq!(found.len(), 6);
        assert_eq!(found[0].kind(), RecordKind::Log);
        assert!(found
            .windows(2)
            .all(|w| w[0].envelope().timestamp() >= w[1].envelope().timestamp()));

        let capped = search([&c, &logs], "items", 2);
        assert_eq!(capped.len(), 2);
        assert_eq!(capped[1].as_request().unwrap().path, "/api/items/4");

        assert!(search([&c, &logs], "  ", 10).is_empty());
    }

    #[test]
    fn test_parallel_path_matches_sequential() {
        let c = requests(2500);
        let mut filter = Filter::page(1, 1000);
        filter.status_code = Some(500);
        let page = run(&c, &filter.normalized());
        assert_eq!(page.total_count, 834);
        assert_eq!(page.items.len(), 834);
    }
}
