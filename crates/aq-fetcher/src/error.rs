//! Fetcher Error Types

use thiserror::Error;

/// Errors that can occur while retrieving observations
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure or server error that persisted through all retries
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Provider kept answering 429 after all retries
    #[error("Rate limited by {provider} after {attempts} attempts")]
    RateLimitError { provider: String, attempts: u32 },

    /// Non-retryable HTTP status
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// Response body did not match the expected shape
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Requested date range is empty or inverted
    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    /// Missing credentials or malformed endpoint settings
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::NetworkError(err.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}
