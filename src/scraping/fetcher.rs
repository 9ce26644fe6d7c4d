//! Retry-wrapped page fetching
//!
//! Two layers:
//! - `HttpTransport`: a single GET over reqwest, non-2xx mapped to an error
//! - `RetryingFetcher`: bounded attempts with a constant backoff between them
//!
//! Everything above this module talks to the `PageFetcher` trait, so tests
//! can substitute canned pages without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::config::FetchConfig;

/// Errors that can occur during fetching
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("Failed to parse URL: {0}")]
    InvalidUrl(String),
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },
}

impl FetchError {
    /// HTTP status code behind this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            Self::Status { status, .. } => Some(*status),
            Self::Exhausted { last, .. } => last.status(),
            Self::InvalidUrl(_) => None,
        }
    }
}

/// A successfully fetched page
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects
    pub url: Url,
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
}

impl Page {
    pub fn new(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            status: 200,
            body: body.into(),
        }
    }
}

/// A single-attempt HTTP GET
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url, timeout: Option<Duration>) -> Result<Page, FetchError>;
}

/// Page retrieval as seen by the rest of the pipeline
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch with an explicit per-request timeout override
    async fn fetch_with_timeout(&self, url: &Url, timeout: Option<Duration>) -> Result<Page, FetchError>;

    /// Fetch with the configured timeout
    async fn fetch(&self, url: &Url) -> Result<Page, FetchError> {
        self.fetch_with_timeout(url, None).await
    }
}

#[async_trait]
impl<F: PageFetcher + ?Sized> PageFetcher for Arc<F> {
    async fn fetch_with_timeout(&self, url: &Url, timeout: Option<Duration>) -> Result<Page, FetchError> {
        (**self).fetch_with_timeout(url, timeout).await
    }
}

/// reqwest-backed transport with fixed session headers
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport from the fetch configuration
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url, timeout: Option<Duration>) -> Result<Page, FetchError> {
        let mut request = self.client.get(url.as_str());
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let final_url = response.url().clone();

        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;

        Ok(Page {
            url: final_url,
            status: status.as_u16(),
            body,
        })
    }
}

/// Attempt ceiling and constant backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first try included (at least 1)
    pub max_attempts: u32,
    /// Wait between consecutive attempts
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &FetchConfig) -> Self {
        Self {
            max_attempts: config.retry_attempts.max(1),
            backoff: config.retry_backoff(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// Fetch statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchStats {
    /// Logical fetches requested
    pub total_fetches: u64,
    /// Individual attempts made (including retries)
    pub attempts: u64,
    /// Fetches that eventually succeeded
    pub successes: u64,
    /// Fetches that exhausted every attempt
    pub failures: u64,
    /// Average time of successful fetches (ms)
    pub avg_fetch_time_ms: f64,
}

/// Fetcher that retries transient failures with a fixed backoff
pub struct RetryingFetcher<T> {
    transport: T,
    policy: RetryPolicy,
    stats: Mutex<FetchStats>,
}

impl RetryingFetcher<HttpTransport> {
    /// Build the production fetcher from configuration
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Ok(Self::new(HttpTransport::new(config)?, RetryPolicy::from_config(config)))
    }
}

impl<T: Transport> RetryingFetcher<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self {
            transport,
            policy,
            stats: Mutex::new(FetchStats::default()),
        }
    }

    /// Get fetch statistics
    pub fn stats(&self) -> FetchStats {
        self.stats.lock().clone()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    fn record_success(&self, elapsed: Duration) {
        let mut stats = self.stats.lock();
        stats.successes += 1;
        let ms = elapsed.as_secs_f64() * 1000.0;
        let n = stats.successes as f64;
        stats.avg_fetch_time_ms = (stats.avg_fetch_time_ms * (n - 1.0) + ms) / n;
    }
}

#[async_trait]
impl<T: Transport> PageFetcher for RetryingFetcher<T> {
    async fn fetch_with_timeout(&self, url: &Url, timeout: Option<Duration>) -> Result<Page, FetchError> {
        self.stats.lock().total_fetches += 1;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.stats.lock().attempts += 1;
            let start = Instant::now();

            let error = match self.transport.get(url, timeout).await {
                Ok(page) => {
                    debug!(url = %url, attempt, max_attempts, status = page.status, "fetched");
                    self.record_success(start.elapsed());
                    return Ok(page);
                }
                Err(e) => e,
            };

            warn!(url = %url, attempt, max_attempts, "request failed: {}", error);

            if attempt >= max_attempts {
                self.stats.lock().failures += 1;
                warn!(url = %url, "giving up after {} attempts", max_attempts);
                return Err(FetchError::Exhausted {
                    attempts: max_attempts,
                    last: Box::new(error),
                });
            }

            tokio::time::sleep(self.policy.backoff).await;
            attempt += 1;
        }
    }
}
