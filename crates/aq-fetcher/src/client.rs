//! HTTP Client with Retry
//!
//! Wraps `reqwest` with exponential backoff for transient failures.

use crate::error::FetchError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound for a server-provided Retry-After delay
const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Fetcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Air-pollution provider base URL
    pub pollution_base_url: String,
    /// Historical weather base URL
    pub weather_archive_url: String,
    /// Weather forecast base URL
    pub weather_forecast_url: String,
    /// Air-pollution provider API key (no default, read from env)
    pub api_key: Option<String>,
    /// How far back the historical fetch reaches
    pub lookback_days: i64,
    /// Days of hourly weather forecast to request
    pub forecast_days: u32,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
    /// Retry attempts after the first request
    pub max_retries: u32,
    /// Retry backoff base in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            pollution_base_url: "http://api.openweathermap.org".to_string(),
            weather_archive_url: "https://archive-api.open-meteo.com".to_string(),
            weather_forecast_url: "https://api.open-meteo.com".to_string(),
            api_key: None,
            lookback_days: 90,
            forecast_days: 4,
            timeout_secs: 30,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

/// Exponential backoff policy
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(config: &FetchConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.retry_backoff_ms),
        )
    }
}

/// Outcome of a single request attempt
enum Attempt {
    Retryable {
        error: FetchError,
        retry_after: Option<Duration>,
    },
    Fatal(FetchError),
}

/// JSON-over-HTTP client shared by the provider clients
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    retry: RetryPolicy,
    /// Provider name for error messages
    provider: String,
}

impl HttpClient {
    /// Create a client for one provider
    pub fn new(provider: &str, config: &FetchConfig) -> Result<Self, FetchError> {
        let inner = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Configuration(e.to_string()))?;

        info!(
            "Creating {} client (max_retries={}, backoff={}ms)",
            provider, config.max_retries, config.retry_backoff_ms
        );

        Ok(Self {
            inner,
            retry: RetryPolicy::from(config),
            provider: provider.to_string(),
        })
    }

    /// GET `url` with `query` and decode the JSON body, retrying transient failures
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let mut attempt = 0;

        loop {
            match self.try_once(url, query).await {
                Ok(body) => return Ok(serde_json::from_str(&body)?),
                Err(Attempt::Fatal(error)) => return Err(error),
                Err(Attempt::Retryable { error, retry_after }) => {
                    if attempt >= self.retry.max_retries {
                        return Err(self.exhausted(error, attempt + 1));
                    }

                    let delay = retry_after.unwrap_or_else(|| self.retry.backoff(attempt));
                    warn!(
                        "{} request failed (attempt {}/{}): {}; retrying in {:?}",
                        self.provider,
                        attempt + 1,
                        self.retry.max_retries + 1,
                        error,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn try_once(&self, url: &str, query: &[(&str, String)]) -> Result<String, Attempt> {
        debug!("GET {}", url);

        let response = match self.inner.get(url).query(query).send().await {
            Ok(response) => response,
            Err(e) => {
                return Err(Attempt::Retryable {
                    error: FetchError::from(e),
                    retry_after: None,
                })
            }
        };

        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| Duration::from_secs(secs.min(MAX_RETRY_AFTER_SECS)));

            return Err(Attempt::Retryable {
                error: FetchError::RateLimitError {
                    provider: self.provider.clone(),
                    attempts: 1,
                },
                retry_after,
            });
        }

        let body = response.text().await.map_err(|e| Attempt::Retryable {
            error: FetchError::from(e),
            retry_after: None,
        })?;

        if status.is_server_error() {
            return Err(Attempt::Retryable {
                error: FetchError::NetworkError(format!(
                    "{} returned {}",
                    self.provider, status
                )),
                retry_after: None,
            });
        }

        if !status.is_success() {
            return Err(Attempt::Fatal(FetchError::Api {
                status: status.as_u16(),
                body,
            }));
        }

        Ok(body)
    }

    fn exhausted(&self, error: FetchError, attempts: u32) -> FetchError {
        match error {
            FetchError::RateLimitError { provider, .. } => {
                FetchError::RateLimitError { provider, attempts }
            }
            other => other,
        }
    }
}
