//! One indexed collection of records

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::types::{Record, RecordKind};

/// A stored record plus its encoded size
#[derive(Debug, Clone)]
pub(crate) struct Stored {
    pub record: Record,
    pub bytes: u64,
}

impl Stored {
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.record.envelope().timestamp()
    }
}

type TimeKey = (DateTime<Utc>, String);

/// Records of a single kind with their secondary indexes.
///
/// Every mutation goes through `insert`/`remove` so the indexes never
/// drift from the primary map.
#[derive(Debug)]
pub(crate) struct Collection {
    kind: RecordKind,
    records: HashMap<String, Stored>,
    by_time: BTreeSet<TimeKey>,
    by_request: HashMap<String, HashSet<String>>,
    /// Lower-cased categorical field: method, level or fault type
    by_category: HashMap<String, HashSet<String>>,
    bytes: u64,
}

impl Collection {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            records: HashMap::new(),
            by_time: BTreeSet::new(),
            by_request: HashMap::new(),
            by_category: HashMap::new(),
            bytes: 0,
        }
    }

    pub fn kind(&self) -> RecordKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn get(&self, id: &str) -> Option<&Stored> {
        self.records.get(id)
    }

    /// Insert or replace by id
    pub fn insert(&mut self, record: Record, bytes: u64) {
        let id = record.id().to_string();
        self.remove(&id);

        let envelope = record.envelope();
        self.by_time.insert((envelope.timestamp(), id.clone()));
        if envelope.has_request() {
            self.by_request
                .entry(envelope.request_id.clone())
                .or_default()
                .insert(id.clone());
        }
        if let Some(category) = category_of(&record) {
            self.by_category.entry(category).or_default().insert(id.clone());
        }
        self.bytes += bytes;
        self.records.insert(id, Stored { record, bytes });
    }

    pub fn remove(&mut self, id: &str) -> Option<Stored> {
        let stored = self.records.remove(id)?;
        let envelope = stored.record.envelope();
        self.by_time.remove(&(stored.timestamp(), id.to_string()));
        if envelope.has_request() {
            unindex(&mut self.by_request, &envelope.request_id, id);
        }
        if let Some(category) = category_of(&stored.record) {
            unindex(&mut self.by_category, &category, id);
        }
        self.bytes = self.bytes.saturating_sub(stored.bytes);
        Some(stored)
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.by_time.clear();
        self.by_request.clear();
        self.by_category.clear();
        self.bytes = 0;
    }

    /// Records oldest first
    pub fn iter_by_time(&self) -> impl DoubleEndedIterator<Item = &Stored> + '_ {
        self.by_time
            .iter()
            .filter_map(move |(_, id)| self.records.get(id))
    }

    /// Records with `from <= timestamp <= to`, oldest first
    pub fn range(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Vec<&Stored> {
        let lower = from.unwrap_or(DateTime::<Utc>::MIN_UTC);
        let upper = to.unwrap_or(DateTime::<Utc>::MAX_UTC);
        if lower > upper {
            return Vec::new();
        }
        self.by_time
            .range((lower, String::new())..)
            .take_while(|(ts, _)| *ts <= upper)
            .filter_map(|(_, id)| self.records.get(id))
            .collect()
    }

    /// Ids of records strictly older than `cutoff`
    pub fn ids_older_than(&self, cutoff: DateTime<Utc>) -> Vec<String> {
        self.by_time
            .iter()
            .take_while(|(ts, _)| *ts < cutoff)
            .map(|(_, id)| id.clone())
            .collect()
    }

    /// Ids of the `n` oldest records
    pub fn oldest_ids(&self, n: usize) -> Vec<String> {
        self.by_time.iter().take(n).map(|(_, id)| id.clone()).collect()
    }

    pub fn ids_for_request(&self, request_id: &str) -> Option<&HashSet<String>> {
        self.by_request.get(request_id)
    }

    pub fn ids_for_category(&self, category: &str) -> Option<&HashSet<String>> {
        self.by_category.get(&category.to_lowercase())
    }
}

fn category_of(record: &Record) -> Option<String> {
    match record {
        Record::Request(r) => Some(r.method.to_lowercase()),
        Record::Log(r) => Some(r.level.to_lowercase()),
        Record::Fault(r) => Some(r.fault_type.to_lowercase()),
        Record::Query(_) => None,
    }
}

fn unindex(index: &mut HashMap<String, HashSet<String>>, key: &str, id: &str) {
    if let Some(ids) = index.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            index.remove(key);
        }
    }
}
