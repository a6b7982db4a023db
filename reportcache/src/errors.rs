use thiserror::Error;

/// Failure of a single upstream page request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("upstream rejected the credential: {0}")]
    Unauthorized(String),

    #[error("upstream unreachable: {0}")]
    Unreachable(String),

    #[error("malformed upstream response: {detail} (payload starts with {prefix:?})")]
    MalformedResponse { detail: String, prefix: String },
}

impl FetchError {
    pub fn malformed(detail: impl Into<String>, payload: &str) -> Self {
        FetchError::MalformedResponse {
            detail: detail.into(),
            prefix: payload_prefix(payload),
        }
    }

    /// Only transport-level failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Unreachable(_))
    }
}

/// Failure of a whole collection run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectionError {
    #[error("collection aborted at page {page}: upstream rejected the credential: {reason}")]
    Unauthorized { page: usize, reason: String },

    #[error("collection aborted at page {page}: upstream unreachable: {reason}")]
    Unreachable { page: usize, reason: String },

    #[error("collection aborted at page {page}: malformed response: {detail} (payload starts with {prefix:?})")]
    MalformedResponse {
        page: usize,
        detail: String,
        prefix: String,
    },

    #[error("collection cancelled")]
    Cancelled,

    #[error("collection task failed: {0}")]
    TaskFailed(String),
}

impl CollectionError {
    pub fn from_fetch(page: usize, err: FetchError) -> Self {
        match err {
            FetchError::Unauthorized(reason) => CollectionError::Unauthorized { page, reason },
            FetchError::Unreachable(reason) => CollectionError::Unreachable { page, reason },
            FetchError::MalformedResponse { detail, prefix } => CollectionError::MalformedResponse {
                page,
                detail,
                prefix,
            },
        }
    }
}

/// Errors surfaced by the query layer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("offset {0} is out of range")]
    OutOfRange(i64),

    #[error("refresh failed: {0}")]
    RefreshFailed(#[from] CollectionError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
pub type CollectionResult<T> = std::result::Result<T, CollectionError>;
pub type Result<T> = std::result::Result<T, QueryError>;

const PAYLOAD_PREFIX_CHARS: usize = 200;

/// First characters of a payload, for operator diagnostics.
pub fn payload_prefix(payload: &str) -> String {
    payload.chars().take(PAYLOAD_PREFIX_CHARS).collect()
}
