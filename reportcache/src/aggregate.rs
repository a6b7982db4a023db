//! Derived statistics over a record set. Always recomputed, never cached.

use std::collections::{BTreeSet, HashMap};

use crate::models::{CacheEntry, CategoryCount, RecordSet, StatisticsSnapshot, WorkRecord};

pub fn summarize(set: &RecordSet) -> StatisticsSnapshot {
    let records = &set.records;
    let dates: BTreeSet<_> = records.iter().filter_map(|record| record.date).collect();
    let start_date = dates.first().copied();
    let latest_date = dates.last().copied();
    let span_days = match (start_date, latest_date) {
        (Some(start), Some(latest)) => (latest - start).num_days(),
        _ => 0,
    };

    StatisticsSnapshot {
        total_records: records.len(),
        working_days: dates.len(),
        start_date,
        latest_date,
        span_days,
        weekly_rate: weekly_rate(records.len(), span_days),
        categories: category_histogram(records),
        pages_loaded: set.pages_loaded,
        collected_at: None,
    }
}

pub fn summarize_entry(entry: &CacheEntry) -> StatisticsSnapshot {
    StatisticsSnapshot {
        collected_at: Some(entry.collected_at),
        ..summarize(&entry.records)
    }
}

/// Records per started week of the date span, to one decimal place.
pub fn weekly_rate(total_records: usize, span_days: i64) -> f64 {
    if span_days <= 0 {
        return 0.0;
    }
    let weeks = ((span_days as f64) / 7.0).ceil();
    ((total_records as f64 / weeks) * 10.0).round() / 10.0
}

/// Counts per category, most frequent first; ties keep first-seen order.
pub fn category_histogram(records: &[WorkRecord]) -> Vec<CategoryCount> {
    let mut position: HashMap<&str, usize> = HashMap::new();
    let mut counts: Vec<CategoryCount> = Vec::new();

    for record in records {
        match position.get(record.category.as_str()) {
            Some(&index) => counts[index].count += 1,
            None => {
                position.insert(record.category.as_str(), counts.len());
                counts.push(CategoryCount {
                    category: record.category.clone(),
                    count: 1,
                });
            }
        }
    }

    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldLayout, RawRow};
    use chrono::NaiveDate;

    fn record(date: &str, category: &str) -> WorkRecord {
        let row: RawRow = ["id", "", date, category].into_iter().collect();
        WorkRecord::decode(&row, &FieldLayout::default())
    }

    fn set(records: Vec<WorkRecord>) -> RecordSet {
        RecordSet {
            rows_seen: records.len(),
            records,
            pages_loaded: 1,
            rows_excluded: 0,
        }
    }

    #[test]
    fn empty_set_has_zero_rate() {
        let stats = summarize(&RecordSet::default());
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.working_days, 0);
        assert_eq!(stats.start_date, None);
        assert_eq!(stats.weekly_rate, 0.0);
        assert!(stats.categories.is_empty());
    }

    #[test]
    fn counts_days_span_and_rate() {
        let stats = summarize(&set(vec![
            record("2025-08-01", "開發"),
            record("2025-08-01 14:00", "會議"),
            record("2025-08-05", "開發"),
            record("2025-08-15", "開發"),
            record("not a date", "會議"),
        ]));

        assert_eq!(stats.total_records, 5);
        assert_eq!(stats.working_days, 3);
        assert_eq!(stats.start_date, NaiveDate::from_ymd_opt(2025, 8, 1));
        assert_eq!(stats.latest_date, NaiveDate::from_ymd_opt(2025, 8, 15));
        assert_eq!(stats.span_days, 14);
        // 14 days -> 2 weeks
        assert_eq!(stats.weekly_rate, 2.5);
    }

    #[test]
    fn single_day_span_has_zero_rate() {
        let stats = summarize(&set(vec![
            record("2025-08-01", "a"),
            record("2025-08-01", "b"),
        ]));
        assert_eq!(stats.span_days, 0);
        assert_eq!(stats.weekly_rate, 0.0);
    }

    #[test]
    fn rate_rounds_to_one_decimal() {
        assert_eq!(weekly_rate(10, 20), 3.3);
        assert_eq!(weekly_rate(7, 1), 7.0);
        assert_eq!(weekly_rate(60, 30), 12.0);
    }

    #[test]
    fn histogram_orders_by_count_then_first_seen() {
        let histogram = category_histogram(&[
            record("", "b"),
            record("", "a"),
            record("", "c"),
            record("", "a"),
            record("", "c"),
            record("", ""),
        ]);
        let order: Vec<_> = histogram
            .iter()
            .map(|c| (c.category.as_str(), c.count))
            .collect();
        assert_eq!(order, vec![("a", 2), ("c", 2), ("b", 1), ("其他", 1)]);
    }
}
