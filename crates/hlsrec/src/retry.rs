// Retry utility: exponential backoff shared by the playlist poller and segment workers.

use crate::error::RecorderError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (not counting the initial attempt).
    pub max_retries: u32,
    /// Base delay between retries. Actual delay = base * 2^attempt.
    pub base_delay: Duration,
    /// Hard cap on the computed delay to prevent unbounded growth.
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Policy with a one second base, i.e. `min(2^attempt, cap)` seconds.
    pub fn seconds(max_retries: u32, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_secs(1),
            max_delay,
        }
    }

    /// Compute the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        // 2^attempt is computed with a checked shift so attempts >= 32 saturate.
        let multiplier = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(multiplier)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Result of a single attempt, used by the caller to signal retryability.
pub enum RetryAction<T> {
    /// Operation succeeded.
    Success(T),
    /// Operation failed with a retryable error (network, bad status, timeout).
    Retry(RecorderError),
    /// Operation failed with a non-retryable error.
    Fail(RecorderError),
}

/// Failure returned once the retry loop gives up.
#[derive(Debug)]
pub struct RetryExhausted {
    /// Number of attempts made, initial attempt included.
    pub attempts: u32,
    pub last_error: RecorderError,
}

/// Execute an async operation with retry-and-backoff.
///
/// The `operation` closure receives the current attempt number (0-indexed) and
/// returns a [`RetryAction`] indicating whether the result is a success,
/// retryable failure, or permanent failure.
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = RetryAction<T>>,
{
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => {
                return Err(RetryExhausted {
                    attempts: attempt + 1,
                    last_error: err,
                });
            }
            RetryAction::Retry(err) => {
                if attempt >= policy.max_retries {
                    return Err(RetryExhausted {
                        attempts: attempt + 1,
                        last_error: err,
                    });
                }
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
