use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

const DAY_MILLIS: i64 = 86_400_000;

/// Inclusive creation-date range; the end bound covers the whole end day
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Lower bound in unix milliseconds (start of the start day)
    pub fn start_millis(&self) -> Option<i64> {
        self.start
            .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp_millis())
    }

    /// Upper bound in unix milliseconds (last millisecond of the end day)
    pub fn end_millis(&self) -> Option<i64> {
        self.end
            .map(|d| d.and_time(NaiveTime::MIN).and_utc().timestamp_millis() + DAY_MILLIS - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    CreatedAt,
    /// Total click/scan aggregate
    Clicks,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDir {
    Asc,
    Desc,
}

/// Exactly one sort key is active at a time; ties are broken by insertion
/// order so a single query stays stable across pages
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sort {
    pub key: SortKey,
    pub dir: SortDir,
}

impl Default for Sort {
    fn default() -> Self {
        Self {
            key: SortKey::CreatedAt,
            dir: SortDir::Desc,
        }
    }
}

/// 1-based page number and page size
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    pub fn offset(&self) -> i64 {
        let page = self.page.max(1);
        (page as i64 - 1) * self.per_page as i64
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
        }
    }
}

/// Filters for link queries; all optional parts combine with AND.
/// Owner scope is always required and is supplied by the caller.
#[derive(Debug, Clone, Default)]
pub struct LinkFilter {
    pub owner_id: String,
    /// Free-text match against title, destination and tag names
    pub search: Option<String>,
    /// Entity must carry at least one of these tag ids
    pub tag_ids: Vec<i64>,
    /// Tri-state: None = any, Some(true/false) = only custom / only generated
    pub custom_code: Option<bool>,
    /// Tri-state on the attached-QR pairing
    pub attached_qr: Option<bool>,
    pub created: DateRange,
}

/// Filters for QR-code queries, parallel in shape to [`LinkFilter`]
#[derive(Debug, Clone, Default)]
pub struct QrCodeFilter {
    pub owner_id: String,
    pub search: Option<String>,
    pub tag_ids: Vec<i64>,
    /// Tri-state on the attached-link pairing
    pub attached_link: Option<bool>,
    pub created: DateRange,
}

/// One page of query results plus the total count for the same filter set
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}
