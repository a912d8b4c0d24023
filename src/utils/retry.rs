//! Retry utilities: backoff builders and caller-side retry.
//!
//! Uses `backon` for exponential backoff with jitter. The core itself never
//! retries a command; `retry_retryable` is for callers that decide to.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::config::ConsistencyConfig;
use crate::error::{Error, Result};

/// Backoff used by the consistency coordinator between watermark polls.
///
/// Unbounded in attempts; the coordinator's deadline bounds the wait.
pub fn coordinator_backoff(config: &ConsistencyConfig) -> ExponentialBuilder {
    let builder = ExponentialBuilder::default()
        .with_min_delay(config.min_delay())
        .with_max_delay(config.max_delay())
        .with_factor(config.factor)
        .with_max_times(usize::MAX);
    if config.jitter {
        builder.with_jitter()
    } else {
        builder
    }
}

/// Standard backoff for callers retrying conflicting commands.
///
/// - Min delay: 10ms
/// - Max delay: 1s
/// - Max attempts: 5
/// - Jitter enabled
pub fn conflict_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_secs(1))
        .with_max_times(5)
        .with_jitter()
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the backoff is exhausted.
///
/// The operation must reload whatever state it depends on on every call;
/// a conflict means the state it loaded is outdated.
pub async fn retry_retryable<T, F, Fut>(backoff: ExponentialBuilder, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    operation
        .retry(backoff)
        .when(Error::is_retryable)
        .notify(|err: &Error, delay: Duration| {
            warn!(error = %err, ?delay, "Retrying after retryable error");
        })
        .await
}
