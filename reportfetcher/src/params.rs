use std::time::Duration;

use serde::Deserialize;

use crate::error::{FetcherError, Result};

/// Wire-level settings for the upstream grid endpoint.
///
/// Parameter names are upstream-specific; the defaults follow the legacy
/// DataTables server-side protocol (`iDisplayStart` / `iDisplayLength`).
#[derive(Debug, Deserialize, Clone)]
pub struct UpstreamConfig {
    pub base_url: String,
    #[serde(default = "default_offset_param")]
    pub offset_param: String,
    #[serde(default = "default_limit_param")]
    pub limit_param: String,
    #[serde(default = "default_extra_params")]
    pub extra_params: Vec<(String, String)>,
    #[serde(default = "default_cache_bust_param")]
    pub cache_bust_param: Option<String>,
    #[serde(default = "default_credential_header")]
    pub credential_header: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default)]
    pub referer: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_offset_param() -> String {
    "iDisplayStart".to_string()
}

fn default_limit_param() -> String {
    "iDisplayLength".to_string()
}

fn default_extra_params() -> Vec<(String, String)> {
    datatables_params(9)
}

fn default_cache_bust_param() -> Option<String> {
    Some("_".to_string())
}

fn default_credential_header() -> String {
    "Cookie".to_string()
}

fn default_user_agent() -> String {
    concat!("reportfetcher/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

/// The fixed query a legacy DataTables grid expects besides paging:
/// echo counter, column mapping and empty per-column searches.
pub fn datatables_params(columns: usize) -> Vec<(String, String)> {
    let mut params = vec![
        ("sEcho".to_string(), "2".to_string()),
        ("iColumns".to_string(), columns.to_string()),
        ("sColumns".to_string(), String::new()),
    ];
    for column in 0..columns {
        params.push((format!("mDataProp_{column}"), column.to_string()));
    }
    params.push(("sSearch".to_string(), String::new()));
    params.push(("bRegex".to_string(), "false".to_string()));
    for column in 0..columns {
        params.push((format!("sSearch_{column}"), String::new()));
        params.push((format!("bRegex_{column}"), "false".to_string()));
        params.push((format!("bSearchable_{column}"), "true".to_string()));
    }
    params
}

impl UpstreamConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            offset_param: default_offset_param(),
            limit_param: default_limit_param(),
            extra_params: default_extra_params(),
            cache_bust_param: default_cache_bust_param(),
            credential_header: default_credential_header(),
            user_agent: default_user_agent(),
            referer: None,
            timeout_secs: default_timeout_secs(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.offset_param.is_empty() || self.limit_param.is_empty() {
            return Err(FetcherError::InvalidParam(
                "offset_param and limit_param must be non-empty".into(),
            ));
        }
        if self.offset_param == self.limit_param {
            return Err(FetcherError::InvalidParam(format!(
                "offset_param and limit_param must differ, both are '{}'",
                self.offset_param
            )));
        }
        if self.timeout_secs == 0 {
            return Err(FetcherError::InvalidParam(
                "timeout_secs must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
