//! HTTP GET with bounded exponential-backoff retry.

use std::future::Future;
use std::time::Duration;

use common::config::FetchConfig;
use common::Error;
use tracing::{debug, warn};

/// Body and the headers we care about from one upstream response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
    /// `Age` header in seconds, when the CDN sent one.
    pub age_secs: Option<u64>,
}

/// Async HTTP GET abstraction so sources can be tested without a network.
pub trait Fetcher: Send + Sync {
    /// Fetch `url`, retrying transient failures. Fails with
    /// `Error::UpstreamUnavailable` once attempts are exhausted.
    fn get(&self, url: &str) -> impl Future<Output = Result<FetchResponse, Error>> + Send;
}

/// Attempt budget and delay schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub retry_count: u32,
    pub base_delay: Duration,
    pub exponential: bool,
}

impl RetryPolicy {
    /// Total attempts: the first one plus at least one retry.
    pub fn attempts(&self) -> u32 {
        self.retry_count.max(1) + 1
    }

    /// Delay after the `failed`-th failed attempt (1-based).
    pub fn delay_after(&self, failed: u32) -> Duration {
        if self.exponential {
            self.base_delay.saturating_mul(2u32.saturating_pow(failed.min(16)))
        } else {
            self.base_delay
        }
    }
}

impl From<&FetchConfig> for RetryPolicy {
    fn from(cfg: &FetchConfig) -> Self {
        Self {
            retry_count: cfg.retry_count,
            base_delay: Duration::from_millis(cfg.retry_delay_ms),
            exponential: cfg.exponential,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&FetchConfig::default())
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
pub async fn retry_with_backoff<T, Op, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: Op,
) -> Result<T, Error>
where
    Op: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let attempts = policy.attempts();
    let mut failed = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => {
                failed += 1;
                if failed >= attempts {
                    return Err(Error::UpstreamUnavailable(format!(
                        "{} failed after {} attempts: {}",
                        what, attempts, e
                    )));
                }
                let delay = policy.delay_after(failed);
                warn!(
                    "{} attempt {}/{} failed: {} (retrying in {:?})",
                    what, failed, attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

/// reqwest-backed [`Fetcher`].
#[derive(Debug, Clone)]
pub struct RetryingFetcher {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(cfg: &FetchConfig) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.as_str())
            .pool_max_idle_per_host(2)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            policy: RetryPolicy::from(cfg),
        })
    }

    async fn get_once(&self, url: &str) -> Result<FetchResponse, Error> {
        debug!("GET {}", url);

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("HTTP error: {}", e)))?;

        let status = resp.status().as_u16();
        let age_secs = resp
            .headers()
            .get(reqwest::header::AGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            let excerpt: String = body.chars().take(200).collect();
            return Err(Error::UpstreamUnavailable(format!(
                "upstream returned {}: {}",
                status, excerpt
            )));
        }

        let body = resp
            .text()
            .await
            .map_err(|e| Error::UpstreamUnavailable(format!("failed to read body: {}", e)))?;

        Ok(FetchResponse {
            status,
            body,
            age_secs,
        })
    }
}

impl Fetcher for RetryingFetcher {
    async fn get(&self, url: &str) -> Result<FetchResponse, Error> {
        retry_with_backoff(&self.policy, url, || self.get_once(url)).await
    }
}
