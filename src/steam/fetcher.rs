//! Resilient fetcher: GET with exponential backoff on transient failures.
//!
//! Transport errors and statuses 429/500/502/503/504 are retried after
//! `min(cap, base * 2^attempt) + jitter`. Other statuses come back to the
//! caller untouched. The final attempt's outcome is returned as-is, even when
//! it is itself a retryable status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, warn};

use super::http::{HttpResponse, Transport, TransportError};

/// Wait strategy for backoff and pacing. Swapped for a no-op in tests.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

impl RetryPolicy {
    /// Search, appdetails, reviews and tag pages.
    pub fn standard() -> Self {
        Self {
            max_attempts: 6,
            base: Duration::from_millis(750),
            cap: Duration::from_secs(8),
            jitter: Duration::from_millis(250),
        }
    }

    /// Best-effort enrichment endpoints give up sooner.
    pub fn enrichment() -> Self {
        Self {
            max_attempts: 4,
            ..Self::standard()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Deterministic part of the wait after the given zero-based attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }

    fn delay_for(&self, attempt: u32, retry_after: Option<u64>) -> Duration {
        let mut delay = self.backoff(attempt);
        if let Some(secs) = retry_after {
            delay = delay.max(Duration::from_secs(secs).min(self.cap));
        }
        if !self.jitter.is_zero() {
            delay += rand::thread_rng().gen_range(Duration::ZERO..self.jitter);
        }
        delay
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport failure for {url} after {attempts} attempt(s): {source}")]
    Transport {
        url: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },
    #[error("http {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("undecodable response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// Turn a non-2xx response into an error, like `raise_for_status`.
pub fn ensure_success(url: &str, resp: HttpResponse) -> Result<HttpResponse, FetchError> {
    if resp.is_success() {
        Ok(resp)
    } else {
        Err(FetchError::Status {
            url: url.to_string(),
            status: resp.status,
        })
    }
}

#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, sleeper: Arc<dyn Sleeper>, policy: RetryPolicy) -> Self {
        Self {
            transport,
            sleeper,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The wait strategy shared with request pacing.
    pub fn sleeper(&self) -> &Arc<dyn Sleeper> {
        &self.sleeper
    }

    pub async fn fetch(
        &self,
        url: &str,
        query: &[(String, String)],
    ) -> Result<HttpResponse, FetchError> {
        let policy = self.policy.clone();
        self.fetch_with(&policy, url, query).await
    }

    pub async fn fetch_with(
        &self,
        policy: &RetryPolicy,
        url: &str,
        query: &[(String, String)],
    ) -> Result<HttpResponse, FetchError> {
        let max_attempts = policy.max_attempts.max(1);
        let mut attempt: u32 = 0;
        loop {
            let is_last = attempt + 1 >= max_attempts;
            match self.transport.get(url, query).await {
                Ok(resp) if is_retryable_status(resp.status) && !is_last => {
                    let delay = policy.delay_for(attempt, resp.retry_after);
                    warn!(
                        url,
                        status = resp.status,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transient upstream status; backing off"
                    );
                    self.sleeper.sleep(delay).await;
                }
                Ok(resp) => {
                    debug!(url, status = resp.status, attempt = attempt + 1, "fetched");
                    return Ok(resp);
                }
                Err(err) if !is_last => {
                    let delay = policy.delay_for(attempt, None);
                    warn!(
                        url,
                        error = %err,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "transport failure; backing off"
                    );
                    self.sleeper.sleep(delay).await;
                }
                Err(err) => {
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        attempts: attempt + 1,
                        source: err,
                    });
                }
            }
            attempt += 1;
        }
    }
}
