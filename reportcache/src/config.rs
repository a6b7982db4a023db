use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Largest page the upstream grid is asked for in one request.
pub const MAX_PAGE_SIZE: usize = 100;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_MAX_PAGES: usize = 20;
/// Upper bound on retries of one page.
pub const MAX_RETRIES: u32 = 10;
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// What to do with rows already gathered when a later page fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    /// A failed page invalidates the whole run.
    #[default]
    AllOrNothing,
    /// Publish what was collected before the failing page, as long as at
    /// least one page succeeded.
    KeepPartial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    pub page_size: usize,
    pub max_pages: usize,
    #[serde(with = "millis")]
    pub page_delay: Duration,
    #[serde(with = "millis")]
    pub request_timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "millis")]
    pub retry_backoff: Duration,
    pub partial_failure: PartialFailurePolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            page_delay: Duration::from_millis(200),
            request_timeout: Duration::from_secs(15),
            max_retries: 2,
            retry_backoff: Duration::from_millis(500),
            partial_failure: PartialFailurePolicy::AllOrNothing,
        }
    }
}

impl CollectorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "page_size must be within 1..={MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.max_pages == 0 {
            return Err(ConfigError::Invalid("max_pages must be at least 1".into()));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(ConfigError::Invalid(format!(
                "max_retries must be at most {MAX_RETRIES}, got {}",
                self.max_retries
            )));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Row-exclusion keywords. A keyword of non-blank parts joined by `+` only
/// matches when every part occurs in the same cell; other keywords, `c++`
/// included, match literally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub exclusion_keywords: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            exclusion_keywords: vec![
                "派工單".to_string(),
                "派工+單".to_string(),
                "work order".to_string(),
                "dispatch order".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryPolicy {
    #[serde(with = "secs")]
    pub ttl: Duration,
    pub serve_stale_on_error: bool,
}

impl Default for QueryPolicy {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            serve_stale_on_error: true,
        }
    }
}

/// Full configuration of the report pipeline, minus the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub collector: CollectorConfig,
    pub filter: FilterConfig,
    pub layout: crate::models::FieldLayout,
    pub query: QueryPolicy,
}

impl ReportConfig {
    pub fn from_json(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: ReportConfig = serde_json::from_value(value)
            .map_err(|err| ConfigError::Invalid(format!("unreadable config: {err}")))?;
        config.collector.validate()?;
        Ok(config)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_upstream_limits() {
        let config = CollectorConfig::default();
        assert_eq!(config.page_size, 50);
        assert_eq!(config.max_pages, 20);
        assert_eq!(config.page_delay, Duration::from_millis(200));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_oversized_pages() {
        let config = CollectorConfig {
            page_size: MAX_PAGE_SIZE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CollectorConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn reads_partial_json() {
        let config = ReportConfig::from_json(json!({
            "collector": { "page_size": 25, "page_delay": 0, "partial_failure": "keep_partial" },
            "query": { "ttl": 60 }
        }))
        .unwrap();
        assert_eq!(config.collector.page_size, 25);
        assert_eq!(config.collector.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(config.collector.page_delay, Duration::ZERO);
        assert_eq!(
            config.collector.partial_failure,
            PartialFailurePolicy::KeepPartial
        );
        assert_eq!(config.query.ttl, Duration::from_secs(60));
        assert!(config.query.serve_stale_on_error);
        assert_eq!(config.filter.exclusion_keywords.len(), 4);
    }

    #[test]
    fn invalid_json_config_is_rejected() {
        let err = ReportConfig::from_json(json!({ "collector": { "page_size": 0 } })).unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn retry_count_is_bounded() {
        let err = ReportConfig::from_json(json!({ "collector": { "max_retries": 40 } })).unwrap_err();
        assert!(err.to_string().contains("max_retries"));

        let config = CollectorConfig {
            max_retries: MAX_RETRIES,
            ..CollectorConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
