use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::{CollectorConfig, PartialFailurePolicy, ReportConfig};
use crate::errors::{CollectionError, CollectionResult, ConfigError, FetchError};
use crate::filter::RecordFilter;
use crate::models::{Credential, FieldLayout, RawPage, RecordSet, WorkRecord};
use crate::upstream::UpstreamClient;

/// Drives the upstream client page by page into one [`RecordSet`].
///
/// Pages are fetched strictly in sequence. A run stops on an empty page, a
/// short page, or after `max_pages` pages, whichever comes first.
pub struct Collector {
    client: Arc<dyn UpstreamClient>,
    filter: RecordFilter,
    layout: FieldLayout,
    config: CollectorConfig,
}

impl Collector {
    pub fn new(
        client: Arc<dyn UpstreamClient>,
        filter: RecordFilter,
        layout: FieldLayout,
        config: CollectorConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            client,
            filter,
            layout,
            config,
        })
    }

    pub fn from_config(
        client: Arc<dyn UpstreamClient>,
        config: &ReportConfig,
    ) -> Result<Self, ConfigError> {
        Self::new(
            client,
            RecordFilter::from_config(&config.filter),
            config.layout.clone(),
            config.collector.clone(),
        )
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub async fn collect_all(
        &self,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> CollectionResult<RecordSet> {
        let page_size = self.config.page_size;
        let mut set = RecordSet::default();
        let mut reached_end = false;

        log::info!(
            "Collecting from '{}' (page size {}, at most {} pages)",
            self.client.name(),
            page_size,
            self.config.max_pages
        );

        for page_index in 0..self.config.max_pages {
            if page_index > 0 {
                pause(self.config.page_delay, cancel).await?;
            }
            if cancel.is_cancelled() {
                return Err(CollectionError::Cancelled);
            }

            let page = match self
                .fetch_with_retry(page_index, credential, cancel)
                .await
            {
                Ok(page) => page,
                Err(CollectionError::Cancelled) => return Err(CollectionError::Cancelled),
                Err(err) => return self.on_page_failure(set, err),
            };
            set.pages_loaded += 1;

            let raw_count = page.row_count();
            if raw_count == 0 {
                log::debug!("Page {} is empty, stopping", page_index + 1);
                reached_end = true;
                break;
            }

            let kept = self.absorb(&mut set, page);
            log::info!(
                "Page {} loaded: {} raw rows, {} kept",
                page_index + 1,
                raw_count,
                kept
            );

            if raw_count < page_size {
                reached_end = true;
                break;
            }
        }

        if !reached_end {
            log::warn!(
                "Stopped at the {}-page ceiling; the upstream may hold more rows",
                self.config.max_pages
            );
        }
        log::info!(
            "Collection finished: {} records from {} pages ({} rows seen, {} excluded)",
            set.len(),
            set.pages_loaded,
            set.rows_seen,
            set.rows_excluded
        );
        Ok(set)
    }

    fn absorb(&self, set: &mut RecordSet, page: RawPage) -> usize {
        let before = set.records.len();
        set.rows_seen += page.row_count();
        for row in &page.rows {
            if self.filter.include(row) {
                set.records.push(WorkRecord::decode(row, &self.layout));
            } else {
                set.rows_excluded += 1;
            }
        }
        set.records.len() - before
    }

    fn on_page_failure(
        &self,
        set: RecordSet,
        err: CollectionError,
    ) -> CollectionResult<RecordSet> {
        if set.pages_loaded > 0 && self.config.partial_failure == PartialFailurePolicy::KeepPartial
        {
            log::warn!(
                "Keeping {} records from {} pages after failure: {}",
                set.len(),
                set.pages_loaded,
                err
            );
            return Ok(set);
        }
        log::error!("Collection failed: {}", err);
        Err(err)
    }

    async fn fetch_with_retry(
        &self,
        page_index: usize,
        credential: &Credential,
        cancel: &CancellationToken,
    ) -> CollectionResult<RawPage> {
        let page_size = self.config.page_size;
        let offset = page_index * page_size;
        let mut attempt: u32 = 0;

        loop {
            let fetch = self.client.fetch_page(offset, page_size, credential);
            let result = match tokio::time::timeout(self.config.request_timeout, fetch).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::Unreachable(format!(
                    "no response within {:?}",
                    self.config.request_timeout
                ))),
            };

            match result {
                Ok(page) => return Ok(page),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    let backoff = retry_delay(self.config.retry_backoff, attempt);
                    log::warn!(
                        "Page {} attempt {} failed ({}); retrying in {:?}",
                        page_index + 1,
                        attempt,
                        err,
                        backoff
                    );
                    pause(backoff, cancel).await?;
                }
                Err(err) => return Err(CollectionError::from_fetch(page_index + 1, err)),
            }
        }
    }
}

/// `base * 2^(attempt - 1)`, saturating instead of overflowing.
fn retry_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> CollectionResult<()> {
    if duration.is_zero() {
        return Ok(());
    }
    tokio::select! {
        _ = cancel.cancelled() => Err(CollectionError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}
