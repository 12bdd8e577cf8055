//! Aggregate statistics and percentile math

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, Utc};

use crate::types::{
    EndpointPerformance, PerformanceMetrics, Record, RequestRecord, SlowQuery, SlowRequest,
    SqlQueryRecord, StatsSnapshot, StatusCodeDistribution,
};

use super::collection::Collection;

/// Entries in each "slowest" list
pub const TOP_N: usize = 10;

/// Characters of query text kept in the slow-query list
pub const QUERY_PREVIEW_CHARS: usize = 100;

/// Value at percentile `p` of ascending `sorted`.
///
/// Index is `ceil(p / 100 * n) - 1`, clamped into the slice.
pub fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as i64 - 1;
    let index = rank.clamp(0, n as i64 - 1) as usize;
    sorted[index] as f64
}

/// Median of ascending `sorted`; mean of the middle pair when even
pub fn median(sorted: &[u64]) -> f64 {
    let n = sorted.len();
    match n {
        0 => 0.0,
        _ if n % 2 == 1 => sorted[n / 2] as f64,
        _ => (sorted[n / 2 - 1] as f64 + sorted[n / 2] as f64) / 2.0,
    }
}

fn mean(values: impl ExactSizeIterator<Item = u64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.map(|v| v as f64).sum::<f64>() / n as f64
}

fn requests(c: &Collection) -> impl Iterator<Item = &RequestRecord> + '_ {
    c.iter_by_time().filter_map(|s| s.record.as_request())
}

fn queries(c: &Collection) -> impl Iterator<Item = &SqlQueryRecord> + '_ {
    c.iter_by_time().filter_map(|s| s.record.as_query())
}

/// Slowest first; equal durations newest first
fn slowest<'a, T, F>(mut items: Vec<&'a T>, duration: F) -> Vec<&'a T>
where
    F: Fn(&T) -> (u64, DateTime<Utc>),
{
    items.sort_by(|a, b| {
        let (da, ta) = duration(*a);
        let (db, tb) = duration(*b);
        db.cmp(&da).then(tb.cmp(&ta))
    });
    items.truncate(TOP_N);
    items
}

fn preview(query: &str) -> String {
    if query.chars().count() <= QUERY_PREVIEW_CHARS {
        query.to_string()
    } else {
        let head: String = query.chars().take(QUERY_PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}

pub(crate) fn snapshot(
    request_c: &Collection,
    query_c: &Collection,
    log_c: &Collection,
    fault_c: &Collection,
) -> StatsSnapshot {
    let mut stats = StatsSnapshot {
        total_requests: request_c.len(),
        total_queries: query_c.len(),
        total_logs: log_c.len(),
        total_faults: fault_c.len(),
        ..Default::default()
    };

    let reqs: Vec<&RequestRecord> = requests(request_c).collect();
    stats.average_response_time = mean(reqs.iter().map(|r| r.execution_time_ms));
    for r in &reqs {
        *stats.status_codes.entry(r.status_code).or_default() += 1;
        *stats.methods.entry(r.method.to_uppercase()).or_default() += 1;
    }
    stats.slowest_requests = slowest(reqs, |r| (r.execution_time_ms, r.envelope.timestamp()))
        .into_iter()
        .map(SlowRequest::from)
        .collect();

    let qs: Vec<&SqlQueryRecord> = queries(query_c).collect();
    stats.average_query_time = mean(qs.iter().map(|q| q.execution_time_ms));
    stats.slowest_queries = slowest(qs, |q| (q.execution_time_ms, q.envelope.timestamp()))
        .into_iter()
        .map(|q| SlowQuery {
            id: q.envelope.id().to_string(),
            query: preview(&q.query),
            execution_time_ms: q.execution_time_ms,
            is_successful: q.is_successful,
            timestamp: q.envelope.timestamp(),
        })
        .collect();

    for stored in fault_c.iter_by_time() {
        if let Record::Fault(f) = &stored.record {
            *stats.fault_types.entry(f.fault_type.clone()).or_default() += 1;
        }
    }
    for stored in log_c.iter_by_time() {
        if let Record::Log(l) = &stored.record {
            *stats.log_levels.entry(l.level.clone()).or_default() += 1;
        }
    }

    stats
}

/// Request timing for records newer than `now - window`
pub(crate) fn performance(
    request_c: &Collection,
    window: Duration,
    now: DateTime<Utc>,
) -> PerformanceMetrics {
    let window_minutes = window.num_minutes().max(1);
    let reqs: Vec<&RequestRecord> = request_c
        .range(Some(now - window), None)
        .into_iter()
        .filter_map(|s| s.record.as_request())
        .collect();

    let mut metrics = PerformanceMetrics {
        window_minutes,
        total_requests: reqs.len(),
        ..Default::default()
    };
    if reqs.is_empty() {
        return metrics;
    }

    let total = reqs.len() as f64;
    let mut times: Vec<u64> = reqs.iter().map(|r| r.execution_time_ms).collect();
    times.sort_unstable();

    metrics.average_response_time = mean(times.iter().copied());
    metrics.median_response_time = median(&times);
    metrics.p95_response_time = percentile(&times, 95.0);
    metrics.p99_response_time = percentile(&times, 99.0);
    metrics.error_rate = reqs.iter().filter(|r| r.is_error()).count() as f64 / total * 100.0;
    metrics.requests_per_minute = total / window_minutes as f64;

    let mut endpoints: HashMap<String, Vec<&RequestRecord>> = HashMap::new();
    for r in &reqs {
        endpoints.entry(r.endpoint()).or_default().push(r);
    }
    let mut slowest: Vec<EndpointPerformance> = endpoints
        .into_iter()
        .map(|(endpoint, group)| {
            let mut times: Vec<u64> = group.iter().map(|r| r.execution_time_ms).collect();
            times.sort_unstable();
            let errors = group.iter().filter(|r| r.is_error()).count();
            EndpointPerformance {
                endpoint,
                average_response_time: mean(times.iter().copied()),
                request_count: group.len(),
                error_rate: errors as f64 / group.len() as f64 * 100.0,
                p95_response_time: percentile(&times, 95.0),
            }
        })
        .collect();
    slowest.sort_by(|a, b| {
        b.average_response_time
            .total_cmp(&a.average_response_time)
            .then_with(|| a.endpoint.cmp(&b.endpoint))
    });
    slowest.truncate(TOP_N);
    metrics.slowest_endpoints = slowest;

    let mut codes: BTreeMap<u16, usize> = BTreeMap::new();
    for r in &reqs {
        *codes.entry(r.status_code).or_default() += 1;
    }
    metrics.status_code_distribution = codes
        .into_iter()
        .map(|(status_code, count)| StatusCodeDistribution {
            status_code,
            count,
            percentage: count as f64 / total * 100.0,
        })
        .collect();

    metrics
}
