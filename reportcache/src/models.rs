use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One upstream grid row: positional cell text, exactly as delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow(pub Vec<String>);

impl RawRow {
    pub fn cells(&self) -> &[String] {
        &self.0
    }

    pub fn cell(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for RawRow {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        RawRow(iter.into_iter().map(Into::into).collect())
    }
}

/// A single page returned by the upstream grid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPage {
    /// Row count the upstream claims to hold in total, when it says so.
    pub total_records: Option<u64>,
    pub rows: Vec<RawRow>,
}

impl RawPage {
    pub fn new(rows: Vec<RawRow>) -> Self {
        Self {
            total_records: None,
            rows,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Index contract of the upstream grid columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldLayout {
    pub id_index: usize,
    pub date_index: usize,
    pub category_index: usize,
    pub content_index: usize,
    /// Category assigned to rows whose category cell is blank.
    pub fallback_category: String,
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self {
            id_index: 0,
            date_index: 2,
            category_index: 3,
            content_index: 8,
            fallback_category: "其他".to_string(),
        }
    }
}

/// A decoded work-log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkRecord {
    pub row_id: Option<String>,
    pub date: Option<NaiveDate>,
    pub date_text: String,
    pub category: String,
    pub content: String,
    pub cells: Vec<String>,
}

impl WorkRecord {
    pub fn decode(row: &RawRow, layout: &FieldLayout) -> Self {
        let text = |index: usize| row.cell(index).map(str::trim).unwrap_or_default();

        let row_id = Some(text(layout.id_index))
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let date_text = text(layout.date_index).to_string();
        let category = match text(layout.category_index) {
            "" => layout.fallback_category.clone(),
            category => category.to_string(),
        };

        Self {
            row_id,
            date: parse_report_date(&date_text),
            date_text,
            category,
            content: row.cell(layout.content_index).unwrap_or_default().to_string(),
            cells: row.cells().to_vec(),
        }
    }
}

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%Y/%m/%d"];

/// Parses the calendar date at the start of a report timestamp cell.
pub fn parse_report_date(text: &str) -> Option<NaiveDate> {
    let head = text
        .trim()
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()?;
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(head, format).ok())
}

/// The filtered, ordered output of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordSet {
    pub records: Vec<WorkRecord>,
    pub pages_loaded: usize,
    pub rows_seen: usize,
    pub rows_excluded: usize,
}

impl RecordSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkRecord> {
        self.records.iter()
    }
}

/// An immutable, fully collected record set and the moment it was collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub records: RecordSet,
    pub collected_at: DateTime<Utc>,
}

/// A contiguous window over the cached (and possibly category-filtered) set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageWindow {
    pub rows: Vec<WorkRecord>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsSnapshot {
    pub total_records: usize,
    pub working_days: usize,
    pub start_date: Option<NaiveDate>,
    pub latest_date: Option<NaiveDate>,
    pub span_days: i64,
    pub weekly_rate: f64,
    pub categories: Vec<CategoryCount>,
    pub pages_loaded: usize,
    pub collected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheInfo {
    pub present: bool,
    pub age_seconds: Option<i64>,
    pub record_count: usize,
    pub collected_at: Option<DateTime<Utc>>,
}

/// Opaque upstream credential, typically a session cookie string.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}
