use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;

use crate::aggregate;
use crate::cache::CacheStore;
use crate::collector::Collector;
use crate::config::QueryPolicy;
use crate::errors::{CollectionError, CollectionResult, QueryError, Result};
use crate::models::{CacheEntry, CacheInfo, Credential, PageWindow, StatisticsSnapshot, WorkRecord};

/// How a query treats the cached entry before answering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Freshness {
    /// Recollect when the entry is absent or older than the TTL.
    #[default]
    IfStale,
    /// Serve any present entry; collect only when nothing is cached.
    AllowStale,
    /// Always recollect.
    Force,
}

/// Case-normalised match against the record category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryCriterion {
    Exact(String),
    Contains(String),
}

impl CategoryCriterion {
    pub fn exact(value: &str) -> Self {
        CategoryCriterion::Exact(value.trim().to_lowercase())
    }

    pub fn contains(value: &str) -> Self {
        CategoryCriterion::Contains(value.trim().to_lowercase())
    }

    pub fn matches(&self, category: &str) -> bool {
        let category = category.trim().to_lowercase();
        match self {
            CategoryCriterion::Exact(needle) => category == *needle,
            CategoryCriterion::Contains(needle) => category.contains(needle.as_str()),
        }
    }
}

type SharedRefresh = Shared<BoxFuture<'static, CollectionResult<Arc<CacheEntry>>>>;

struct InFlight {
    id: u64,
    cancel: CancellationToken,
    refresh: SharedRefresh,
}

/// Query interface over the cached work-report set.
///
/// At most one collection run is in flight at a time; concurrent callers
/// that need a refresh await the same run and observe the same outcome.
pub struct ReportService {
    collector: Arc<Collector>,
    cache: Arc<CacheStore>,
    credential: Credential,
    policy: QueryPolicy,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    next_run: AtomicU64,
    shutdown: CancellationToken,
}

impl ReportService {
    pub fn new(
        collector: Arc<Collector>,
        cache: Arc<CacheStore>,
        credential: Credential,
        policy: QueryPolicy,
    ) -> Self {
        Self {
            collector,
            cache,
            credential,
            policy,
            in_flight: Arc::new(Mutex::new(None)),
            next_run: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn policy(&self) -> &QueryPolicy {
        &self.policy
    }

    pub async fn list_page(
        &self,
        offset: i64,
        limit: usize,
        freshness: Freshness,
    ) -> Result<PageWindow> {
        let offset = checked_offset(offset)?;
        let entry = self.ensure_fresh(freshness).await?;
        Ok(window(&entry.records.records, offset, limit))
    }

    pub async fn list_by_category(
        &self,
        criterion: &CategoryCriterion,
        offset: i64,
        limit: usize,
        freshness: Freshness,
    ) -> Result<PageWindow> {
        let offset = checked_offset(offset)?;
        let entry = self.ensure_fresh(freshness).await?;
        let matching: Vec<WorkRecord> = entry
            .records
            .iter()
            .filter(|record| criterion.matches(&record.category))
            .cloned()
            .collect();
        Ok(window(&matching, offset, limit))
    }

    pub async fn statistics(&self, freshness: Freshness) -> Result<StatisticsSnapshot> {
        let entry = self.ensure_fresh(freshness).await?;
        Ok(aggregate::summarize_entry(&entry))
    }

    pub async fn force_refresh(&self) -> Result<Arc<CacheEntry>> {
        self.ensure_fresh(Freshness::Force).await
    }

    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    pub fn invalidate(&self) {
        self.cache.invalidate();
    }

    /// Aborts the in-flight collection, if any. Its waiters receive
    /// [`CollectionError::Cancelled`].
    pub fn cancel_refresh(&self) {
        if let Some(in_flight) = lock_slot(&self.in_flight).as_ref() {
            log::info!("Cancelling refresh run {}", in_flight.id);
            in_flight.cancel.cancel();
        }
    }

    /// Cancels the current run and every run started afterwards.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    async fn ensure_fresh(&self, freshness: Freshness) -> Result<Arc<CacheEntry>> {
        let current = self.cache.get();
        if let Some(entry) = &current {
            let usable = match freshness {
                Freshness::Force => false,
                Freshness::AllowStale => true,
                Freshness::IfStale => !CacheStore::is_stale(entry, self.policy.ttl),
            };
            if usable {
                return Ok(Arc::clone(entry));
            }
        }

        match self.refresh().await {
            Ok(entry) => Ok(entry),
            Err(err) => match current {
                Some(entry)
                    if self.policy.serve_stale_on_error
                        && err != CollectionError::Cancelled =>
                {
                    log::warn!(
                        "Refresh failed, serving entry collected at {}: {}",
                        entry.collected_at,
                        err
                    );
                    Ok(entry)
                }
                _ => Err(QueryError::RefreshFailed(err)),
            },
        }
    }

    /// Joins the in-flight run or starts a new one.
    async fn refresh(&self) -> CollectionResult<Arc<CacheEntry>> {
        let refresh = {
            let mut slot = lock_slot(&self.in_flight);
            match slot.as_ref() {
                Some(in_flight) => {
                    log::debug!("Joining refresh run {}", in_flight.id);
                    in_flight.refresh.clone()
                }
                None => {
                    let in_flight = self.start_run();
                    let joined = in_flight.refresh.clone();
                    *slot = Some(in_flight);
                    joined
                }
            }
        };

        refresh.await
    }

    /// Spawns a collection run. The run owns its completion: it publishes
    /// the entry and releases the in-flight slot even when every waiter has
    /// gone away. Must be called with the slot locked.
    fn start_run(&self) -> InFlight {
        let id = self.next_run.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = self.shutdown.child_token();
        let collector = Arc::clone(&self.collector);
        let cache = Arc::clone(&self.cache);
        let credential = self.credential.clone();
        let slot = Arc::clone(&self.in_flight);
        let token = cancel.clone();

        log::info!("Starting refresh run {}", id);
        let task = tokio::spawn(async move {
            let outcome = collector
                .collect_all(&credential, &token)
                .await
                .map(|records| cache.set(records));

            let mut current = lock_slot(&slot);
            if current.as_ref().map(|in_flight| in_flight.id) == Some(id) {
                *current = None;
            }
            outcome
        });

        let refresh = async move {
            task.await.unwrap_or_else(|err| {
                log::error!("Refresh run {} did not finish: {}", id, err);
                Err(CollectionError::TaskFailed(err.to_string()))
            })
        }
        .boxed()
        .shared();

        InFlight {
            id,
            cancel,
            refresh,
        }
    }
}

fn lock_slot(slot: &Mutex<Option<InFlight>>) -> MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn checked_offset(offset: i64) -> Result<usize> {
    usize::try_from(offset).map_err(|_| QueryError::OutOfRange(offset))
}

fn window(records: &[WorkRecord], offset: usize, limit: usize) -> PageWindow {
    let total = records.len();
    let start = offset.min(total);
    let end = start.saturating_add(limit).min(total);
    PageWindow {
        rows: records[start..end].to_vec(),
        total,
        offset,
        limit,
        has_more: end < total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldLayout, RawRow};
    use proptest::prelude::*;

    fn records(count: usize) -> Vec<WorkRecord> {
        (0..count)
            .map(|i| {
                let row: RawRow = [i.to_string()].into_iter().collect();
                WorkRecord::decode(&row, &FieldLayout::default())
            })
            .collect()
    }

    #[test]
    fn negative_offset_is_out_of_range() {
        assert_eq!(checked_offset(-1), Err(QueryError::OutOfRange(-1)));
        assert_eq!(checked_offset(7), Ok(7));
    }

    #[test]
    fn criterion_normalises_case_and_whitespace() {
        assert!(CategoryCriterion::exact(" Bug Fix ").matches("bug fix"));
        assert!(!CategoryCriterion::exact("bug").matches("bug fix"));
        assert!(CategoryCriterion::contains("FIX").matches("Bug Fix"));
        assert!(CategoryCriterion::contains("").matches("anything"));
    }

    #[test]
    fn window_past_end_is_empty_but_reports_total() {
        let page = window(&records(5), 9, 3);
        assert!(page.rows.is_empty());
        assert_eq!(page.total, 5);
        assert!(!page.has_more);
    }

    proptest! {
        #[test]
        fn window_is_contiguous_ordered_slice(
            total in 0usize..120,
            offset in 0usize..150,
            limit in 0usize..60,
        ) {
            let all = records(total);
            let page = window(&all, offset, limit);

            let expected = if offset >= total { 0 } else { limit.min(total - offset) };
            prop_assert_eq!(page.rows.len(), expected);
            prop_assert_eq!(page.total, total);
            for (i, row) in page.rows.iter().enumerate() {
                prop_assert_eq!(row, &all[offset + i]);
            }
            prop_assert_eq!(page.has_more, offset + expected < total);
        }
    }
}
