//! Exponential retry for transient transport failures.
//!
//! Rate limits are handled separately by [`crate::rate_limit`], which
//! sleeps until the quota window resets. This module covers the other kind
//! of failure an idempotent GET can hit: connection resets and timeouts.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

/// Initial delay before the first transport retry.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Upper bound on the delay between transport retries.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Maximum number of transport retries per request.
pub const MAX_TRANSPORT_RETRIES: usize = 5;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Minimum delay between retries.
    pub min_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of retry attempts.
    pub max_retries: usize,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_retries: MAX_TRANSPORT_RETRIES,
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(min_delay: Duration, max_delay: Duration, max_retries: usize) -> Self {
        Self {
            min_delay,
            max_delay,
            max_retries,
            with_jitter: true,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Default backoff: 1s initial, 60s cap, 5 retries, jitter.
#[must_use]
pub fn default_backoff() -> ExponentialBuilder {
    RetryConfig::default().into_backoff()
}

/// Execute an operation, retrying errors that `is_transient` accepts.
///
/// `context` names the request in debug logs (usually the URL).
pub async fn with_retry<T, E, F, Fut, IsTransient, ShortMsg>(
    operation: F,
    backoff: ExponentialBuilder,
    is_transient: IsTransient,
    short_message: ShortMsg,
    context: &str,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    IsTransient: FnMut(&E) -> bool,
    ShortMsg: Fn(&E) -> String,
{
    let attempt = AtomicU32::new(0);
    let mut operation = operation;

    let retry_op = || {
        attempt.fetch_add(1, Ordering::SeqCst);
        operation()
    };

    retry_op
        .retry(backoff)
        .notify(|err, dur| {
            tracing::debug!(
                "Transient failure on {}, retrying in {:?} (attempt {}): {}",
                context,
                dur,
                attempt.load(Ordering::SeqCst),
                short_message(err)
            );
        })
        .when(is_transient)
        .await
}
