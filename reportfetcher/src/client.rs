use async_trait::async_trait;
use reportcache::config::MAX_PAGE_SIZE;
use reportcache::errors::{FetchError, FetchResult};
use reportcache::models::{Credential, RawPage};
use reportcache::upstream::UpstreamClient;
use reqwest::header::{HeaderName, HeaderValue, ACCEPT, REFERER};
use reqwest::StatusCode;
use url::Url;

use crate::envelope;
use crate::error::{FetcherError, Result};
use crate::params::UpstreamConfig;

const ACCEPT_GRID_JSON: &str = "application/json, text/javascript, */*; q=0.01";

/// `reqwest`-backed client for the upstream work-report grid.
#[derive(Clone, Debug)]
pub struct HttpUpstreamClient {
    http_client: reqwest::Client,
    base_url: Url,
    credential_header: HeaderName,
    config: UpstreamConfig,
}

impl HttpUpstreamClient {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        config.validate()?;
        let base_url = Url::parse(&config.base_url)?;
        let credential_header = HeaderName::from_bytes(config.credential_header.as_bytes())
            .map_err(|err| {
                FetcherError::InvalidParam(format!(
                    "credential_header '{}' is not a header name: {err}",
                    config.credential_header
                ))
            })?;
        let http_client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            credential_header,
            config,
        })
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    /// The request URL for one page.
    pub fn page_url(&self, offset: usize, page_size: usize) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in &self.config.extra_params {
                query.append_pair(key, value);
            }
            query.append_pair(&self.config.offset_param, &offset.to_string());
            query.append_pair(&self.config.limit_param, &page_size.to_string());
            if let Some(param) = &self.config.cache_bust_param {
                query.append_pair(param, &chrono::Utc::now().timestamp_millis().to_string());
            }
        }
        url
    }

    fn credential_value(&self, credential: &Credential) -> FetchResult<Option<HeaderValue>> {
        if credential.is_empty() {
            return Ok(None);
        }
        HeaderValue::from_str(credential.as_str())
            .map(|mut value| {
                value.set_sensitive(true);
                Some(value)
            })
            .map_err(|_| {
                FetchError::Unauthorized("credential is not a valid header value".into())
            })
    }
}

#[async_trait]
impl UpstreamClient for HttpUpstreamClient {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_page(
        &self,
        offset: usize,
        page_size: usize,
        credential: &Credential,
    ) -> FetchResult<RawPage> {
        let requested = page_size;
        let page_size = requested.clamp(1, MAX_PAGE_SIZE);
        if page_size != requested {
            log::warn!(
                "Page size {} is outside 1..={}, requesting {} rows instead",
                requested,
                MAX_PAGE_SIZE,
                page_size
            );
        }
        let url = self.page_url(offset, page_size);
        log::debug!("GET {} (offset {}, length {})", self.base_url, offset, page_size);

        let mut request = self
            .http_client
            .get(url)
            .header(ACCEPT, ACCEPT_GRID_JSON)
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(value) = self.credential_value(credential)? {
            request = request.header(self.credential_header.clone(), value);
        }
        if let Some(referer) = &self.config.referer {
            request = request.header(REFERER, referer.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|err| FetchError::Unreachable(err.without_url().to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| FetchError::Unreachable(err.without_url().to_string()))?;

        classify_status(status, &body)?;
        envelope::decode_page(&body)
    }
}

fn classify_status(status: StatusCode, body: &str) -> FetchResult<()> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(FetchError::Unauthorized(format!("HTTP {status}")))
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Err(FetchError::Unreachable(format!("HTTP {status}")))
        }
        status if status.is_server_error() => {
            Err(FetchError::Unreachable(format!("HTTP {status}")))
        }
        status => Err(FetchError::malformed(format!("HTTP {status}"), body)),
    }
}
