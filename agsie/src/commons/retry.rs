//! Bounded retry with exponential backoff for the two network calls of an analysis.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{AnalysisError, Result};

/// How often and how patiently a network call is retried.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempts in total, first one included
    pub max_attempts: u32,
    /// Delay before the second attempt (doubles each retry)
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Deadline of a single attempt
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            attempt_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry(attempt_timeout: Duration) -> Self {
        Self {
            max_attempts: 1,
            attempt_timeout,
            ..Self::default()
        }
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// attempts are exhausted. A timed-out attempt becomes `on_timeout(deadline)`,
/// which callers build as their own retryable error kind.
pub async fn with_retry<T, F, Fut, E>(
    policy: &RetryPolicy,
    what: &str,
    on_timeout: E,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    E: Fn(Duration) -> AnalysisError,
{
    let mut attempt = 0;
    let mut delay = policy.initial_backoff.min(policy.max_backoff);

    loop {
        attempt += 1;

        let outcome = match tokio::time::timeout(policy.attempt_timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(on_timeout(policy.attempt_timeout)),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                warn!(
                    what,
                    error = %e,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_backoff);
            }
            Err(e) => return Err(e),
        }
    }
}
