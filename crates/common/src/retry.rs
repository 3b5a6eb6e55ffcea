//! Bounded retry with exponential backoff for optimistic-lock conflicts.

use std::future::Future;
use std::time::Duration;

/// Retry configuration: attempt count and base backoff delay.
///
/// The delay before attempt `n` (1-based) is `base_delay * 2^n`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(50),
        }
    }
}

/// Runs `op` until it succeeds, the error is not retryable, or the policy's
/// attempt budget is exhausted.
///
/// `retryable` decides per error whether another attempt is worthwhile;
/// non-retryable errors are returned immediately.
pub async fn with_retry<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    retryable: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if !retryable(&err) => return Err(err),
            Err(err) => {
                attempt += 1;
                metrics::counter!("retry_conflicts_total", "op" => label.to_string()).increment(1);
                if attempt >= policy.max_attempts {
                    tracing::error!(%err, label, attempt, "retry budget exhausted");
                    return Err(err);
                }
                let delay = policy.base_delay * 2u32.pow(attempt);
                tracing::warn!(%err, label, attempt, ?delay, "retrying after conflict");
                tokio::time::sleep(delay).await;
            }
        }
    }
}
