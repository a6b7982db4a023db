use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};

use crate::models::{CacheEntry, CacheInfo, RecordSet};

/// Holds the last fully collected record set.
///
/// The entry is an immutable snapshot behind an atomic pointer: `set`
/// replaces it in one swap and readers keep whatever `Arc` they loaded.
#[derive(Default)]
pub struct CacheStore {
    slot: ArcSwapOption<CacheEntry>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<CacheEntry>> {
        self.slot.load_full()
    }

    pub fn set(&self, records: RecordSet) -> Arc<CacheEntry> {
        self.set_at(records, Utc::now())
    }

    pub fn set_at(&self, records: RecordSet, collected_at: DateTime<Utc>) -> Arc<CacheEntry> {
        let entry = Arc::new(CacheEntry {
            records,
            collected_at,
        });
        self.slot.store(Some(Arc::clone(&entry)));
        log::debug!(
            "Cache replaced with {} records collected at {}",
            entry.records.len(),
            entry.collected_at
        );
        entry
    }

    pub fn invalidate(&self) {
        if self.slot.swap(None).is_some() {
            log::info!("Cache invalidated");
        }
    }

    pub fn is_stale(entry: &CacheEntry, max_age: Duration) -> bool {
        Self::is_stale_at(entry, max_age, Utc::now())
    }

    /// Stale once strictly more than `max_age` has elapsed since collection.
    pub fn is_stale_at(entry: &CacheEntry, max_age: Duration, now: DateTime<Utc>) -> bool {
        let max_age = match chrono::Duration::from_std(max_age) {
            Ok(max_age) => max_age,
            Err(_) => return false,
        };
        now - entry.collected_at > max_age
    }

    pub fn info(&self) -> CacheInfo {
        self.info_at(Utc::now())
    }

    pub fn info_at(&self, now: DateTime<Utc>) -> CacheInfo {
        match self.get() {
            Some(entry) => CacheInfo {
                present: true,
                age_seconds: Some((now - entry.collected_at).num_seconds().max(0)),
                record_count: entry.records.len(),
                collected_at: Some(entry.collected_at),
            },
            None => CacheInfo {
                present: false,
                age_seconds: None,
                record_count: 0,
                collected_at: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldLayout, RawRow, WorkRecord};

    fn records(count: usize) -> RecordSet {
        let layout = FieldLayout::default();
        RecordSet {
            records: (0..count)
                .map(|i| {
                    let row: RawRow = [i.to_string(), String::new(), "2025-08-01".to_string()]
                        .into_iter()
                        .collect();
                    WorkRecord::decode(&row, &layout)
                })
                .collect(),
            pages_loaded: 1,
            rows_seen: count,
            rows_excluded: 0,
        }
    }

    #[test]
    fn fresh_right_after_set_and_stale_past_ttl() {
        let store = CacheStore::new();
        let ttl = Duration::from_secs(24 * 3600);
        let entry = store.set(records(3));

        assert!(!CacheStore::is_stale(&entry, ttl));
        let boundary = entry.collected_at + chrono::Duration::hours(24);
        assert!(!CacheStore::is_stale_at(&entry, ttl, boundary));
        assert!(CacheStore::is_stale_at(
            &entry,
            ttl,
            boundary + chrono::Duration::seconds(1)
        ));
    }

    #[test]
    fn set_replaces_whole_entry() {
        let store = CacheStore::new();
        assert!(store.get().is_none());

        let first = store.set(records(2));
        let held = store.get().unwrap();
        let second = store.set(records(5));

        assert_eq!(held.records.len(), 2);
        assert!(Arc::ptr_eq(&held, &first));
        assert_eq!(store.get().unwrap().records.len(), 5);
        assert!(Arc::ptr_eq(&store.get().unwrap(), &second));
    }

    #[test]
    fn invalidate_clears_entry() {
        let store = CacheStore::new();
        store.set(records(1));
        store.invalidate();
        assert!(store.get().is_none());
        assert!(!store.info().present);
    }

    #[test]
    fn info_reports_age_and_count() {
        let store = CacheStore::new();
        let collected = Utc::now() - chrono::Duration::seconds(90);
        store.set_at(records(4), collected);

        let info = store.info_at(collected + chrono::Duration::seconds(90));
        assert!(info.present);
        assert_eq!(info.age_seconds, Some(90));
        assert_eq!(info.record_count, 4);
        assert_eq!(info.collected_at, Some(collected));
    }
}
