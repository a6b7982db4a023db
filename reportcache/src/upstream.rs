use async_trait::async_trait;

use crate::errors::FetchResult;
use crate::models::{Credential, RawPage};

/// A source of upstream grid pages.
///
/// Implementations issue exactly one request per call and never retry;
/// retry and pacing belong to the [`Collector`](crate::collector::Collector).
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_page(
        &self,
        offset: usize,
        page_size: usize,
        credential: &Credential,
    ) -> FetchResult<RawPage>;
}
