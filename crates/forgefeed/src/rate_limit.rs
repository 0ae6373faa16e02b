//! Rate-limit backoff and request pacing.
//!
//! When GitHub reports an exhausted quota the connector sleeps until the
//! window resets plus a fixed margin, then retries the same logical
//! operation. Each logical operation (a repository fetch, a page fetch)
//! gets at most [`MAX_RATE_LIMIT_RETRIES`] such retries.

use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::connector::ConnectorError;
use crate::github::{GitHubError, short_error_message};

/// Retries allowed per logical operation after the initial attempt.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Margin added past the reported reset time.
pub const RESET_MARGIN: StdDuration = StdDuration::from_secs(60);

/// Anything that can report when the rate-limit window resets.
#[async_trait]
pub trait RateLimitSource: Send + Sync {
    async fn rate_limit_reset(&self) -> Result<DateTime<Utc>, GitHubError>;
}

/// Sleep needed before retrying: time until reset (never negative) plus
/// [`RESET_MARGIN`].
pub fn sleep_duration(reset_at: DateTime<Utc>, now: DateTime<Utc>) -> StdDuration {
    let until_reset = (reset_at - now).to_std().unwrap_or(StdDuration::ZERO);
    until_reset + RESET_MARGIN
}

/// Block until the rate-limit window for `source` has reset.
///
/// If the reset time cannot be read the window is assumed to reset now, so
/// the sleep is just the margin.
pub async fn await_reset(source: &dyn RateLimitSource) {
    let now = Utc::now();
    let reset_at = match source.rate_limit_reset().await {
        Ok(reset_at) => reset_at,
        Err(e) => {
            tracing::warn!(
                "Could not read rate limit reset time: {}",
                short_error_message(&e)
            );
            now
        }
    };

    let sleep = sleep_duration(reset_at, now);
    tracing::info!("Rate limit exceeded, sleeping for {:?}", sleep);
    tokio::time::sleep(sleep).await;
}

/// Per-operation retry counter for rate-limit backoff.
#[derive(Debug)]
pub struct RetryBudget {
    operation: &'static str,
    retries: u32,
}

impl RetryBudget {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            retries: 0,
        }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Spend one retry: sleep until the window resets, or fail once the
    /// budget is exhausted.
    pub async fn backoff(&mut self, source: &dyn RateLimitSource) -> Result<(), ConnectorError> {
        if self.retries >= MAX_RATE_LIMIT_RETRIES {
            return Err(ConnectorError::RetriesExhausted {
                operation: self.operation.to_string(),
            });
        }
        self.retries += 1;
        tracing::debug!(
            "Rate limited during {} (retry {}/{})",
            self.operation,
            self.retries,
            MAX_RATE_LIMIT_RETRIES
        );
        await_reset(source).await;
        Ok(())
    }
}

/// Run `operation`, backing off and retrying on rate-limit errors.
///
/// Any other error is returned unchanged.
pub async fn retry_rate_limited<T, F, Fut>(
    source: &dyn RateLimitSource,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, ConnectorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GitHubError>>,
{
    let mut budget = RetryBudget::new(operation_name);
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_rate_limited() => budget.backoff(source).await?,
            Err(e) => return Err(e.into()),
        }
    }
}

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Proactive request pacing with a token bucket.
///
/// ```ignore
/// let limiter = ApiRateLimiter::new(10); // 10 requests per second
///
/// // Before each API call:
/// limiter.wait().await;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}

impl ApiRateLimiter {
    /// Create a limiter allowing `requests_per_second` (0 is treated as 1).
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            inner: Arc::new(RateLimiter::direct(Quota::per_second(rps))),
        }
    }

    /// Wait until a request is allowed.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}
