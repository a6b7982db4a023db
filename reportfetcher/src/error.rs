use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, FetcherError>;
