//! Query filter and paged results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: usize = 1000;

/// Page size used when the caller does not ask for one
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Allow-listed sort fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Timestamp,
    ExecutionTimeMs,
    StatusCode,
    Method,
    Path,
    Level,
    Message,
}

impl SortField {
    /// Parse a field name case-insensitively, falling back to `Timestamp`
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "executiontimems" => SortField::ExecutionTimeMs,
            "statuscode" => SortField::StatusCode,
            "method" => SortField::Method,
            "path" => SortField::Path,
            "level" => SortField::Level,
            "message" => SortField::Message,
            _ => SortField::Timestamp,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortField::Timestamp => "timestamp",
            SortField::ExecutionTimeMs => "executiontimems",
            SortField::StatusCode => "statuscode",
            SortField::Method => "method",
            SortField::Path => "path",
            SortField::Level => "level",
            SortField::Message => "message",
        }
    }
}

/// Filter, sort and page specification for one collection.
///
/// Predicates that do not apply to the queried kind are ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Filter {
    pub page: usize,
    pub page_size: usize,
    pub sort_by: String,
    pub sort_descending: bool,
    pub search: Option<String>,
    pub method: Option<String>,
    pub path: Option<String>,
    pub status_code: Option<u16>,
    pub level: Option<String>,
    pub tag: Option<String>,
    pub category: Option<String>,
    pub fault_type: Option<String>,
    pub request_id: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub min_execution_time: Option<u64>,
    pub max_execution_time: Option<u64>,
    pub is_successful: Option<bool>,
    pub is_slow: Option<bool>,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort_by: SortField::Timestamp.as_str().to_string(),
            sort_descending: true,
            search: None,
            method: None,
            path: None,
            status_code: None,
            level: None,
            tag: None,
            category: None,
            fault_type: None,
            request_id: None,
            date_from: None,
            date_to: None,
            min_execution_time: None,
            max_execution_time: None,
            is_successful: None,
            is_slow: None,
        }
    }
}

impl Filter {
    pub fn page(page: usize, page_size: usize) -> Self {
        Self {
            page,
            page_size,
            ..Default::default()
        }
    }

    pub fn sorted_by(mut self, field: &str, descending: bool) -> Self {
        self.sort_by = field.to_string();
        self.sort_descending = descending;
        self
    }

    /// Clamp paging into bounds and canonicalize the sort field.
    ///
    /// Blank text predicates are dropped so that `?method=` behaves like no
    /// method filter at all.
    pub fn normalize(&mut self) {
        self.page = self.page.max(1);
        self.page_size = self.page_size.clamp(1, MAX_PAGE_SIZE);
        self.sort_by = SortField::parse(&self.sort_by).as_str().to_string();

        for field in [
            &mut self.search,
            &mut self.method,
            &mut self.path,
            &mut self.level,
            &mut self.tag,
            &mut self.category,
            &mut self.fault_type,
            &mut self.request_id,
        ] {
            if field.as_deref().map_or(false, |s| s.trim().is_empty()) {
                *field = None;
            }
        }
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    pub fn sort_field(&self) -> SortField {
        SortField::parse(&self.sort_by)
    }

    /// Number of items skipped before the current page
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

/// One page of query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl<T> PagedResult<T> {
    pub fn new(items: Vec<T>, total_count: usize, page: usize, page_size: usize) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_count.div_ceil(page_size)
        };
        Self {
            items,
            total_count,
            page,
            page_size,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total_count: self.total_count,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
        }
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_clamps_paging() {
        let mut filter = Filter::page(0, 5000);
        filter.normalize();
        assert_eq!(filter.page, 1);
        assert_eq!(filter.page_size, MAX_PAGE_SIZE);

        let filter = Filter::page(3, 0).normalized();
        assert_eq!(filter.page_size, 1);
        assert_eq!(filter.offset(), 2);
    }

    #[test]
    fn test_unknown_sort_field_falls_back_to_timestamp() {
        let filter = Filter::default().sorted_by("DROP TABLE", false).normalized();
        assert_eq!(filter.sort_by, "timestamp");

        let filter = Filter::default().sorted_by("ExecutionTimeMs", true).normalized();
        assert_eq!(filter.sort_field(), SortField::ExecutionTimeMs);
        assert_eq!(filter.sort_by, "executiontimems");
    }

    #[test]
    fn test_blank_predicates_are_dropped() {
        let mut filter = Filter::default();
        filter.method = Some("  ".to_string());
        filter.path = Some("/api".to_string());
        filter.normalize();
        assert!(filter.method.is_none());
        assert_eq!(filter.path.as_deref(), Some("/api"));
    }

    #[test]
    fn test_paged_result_page_count() {
        let page: PagedResult<u32> = PagedResult::new(vec![6, 7, 8, 9, 10], 12, 2, 5);
        assert_eq!(page.total_pages, 3);
        assert!(page.has_next());

        let empty: PagedResult<u32> = PagedResult::new(Vec::new(), 0, 1, 50);
        assert_eq!(empty.total_pages, 0);
    }
}
