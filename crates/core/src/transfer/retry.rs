//! Bounded retry with exponential backoff for transfer operations.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use super::error::TransferError;
use crate::job::{ErrorKind, JobError};
use crate::metrics;

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Exponential backoff policy with caps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self {
            retries,
            base_delay,
            ..Self::default()
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// `attempt` is 1-based (1 = first attempt).
    pub fn decide(&self, attempt: u32, error: &TransferError) -> RetryDecision {
        if attempt >= self.max_attempts() || !error.is_transient() {
            return RetryDecision::NoRetry;
        }

        // base * 2^(attempt-1), capped.
        let exp = 1u32 << attempt.saturating_sub(1).min(8);
        let delay = self.base_delay.saturating_mul(exp).min(self.max_delay);
        RetryDecision::RetryAfter(delay)
    }
}

/// A transfer operation that failed for good.
#[derive(Debug)]
pub struct RetryFailure {
    pub error: TransferError,
    pub attempts: u32,
}

impl std::fmt::Display for RetryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.attempts > 1 {
            write!(f, "{} (after {} attempts)", self.error, self.attempts)
        } else {
            write!(f, "{}", self.error)
        }
    }
}

impl std::error::Error for RetryFailure {}

impl RetryFailure {
    /// Record the failure on a job, keeping the transient/permanent split.
    pub fn into_job_error(self, operation: &str) -> JobError {
        let kind = if self.error.is_transient() {
            ErrorKind::TransientTransfer
        } else {
            ErrorKind::PermanentTransfer
        };
        JobError::new(kind, format!("{} failed: {}", operation, self))
    }
}

/// Runs `op` until it succeeds or the policy says to stop.
///
/// Permanent errors stop immediately; transient ones are retried after
/// the backoff delay.
pub async fn run_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, RetryFailure>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransferError>>,
{
    let mut attempt = 1u32;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(error) => match policy.decide(attempt, &error) {
                RetryDecision::NoRetry => return Err(RetryFailure { error, attempts: attempt }),
                RetryDecision::RetryAfter(delay) => {
                    warn!(
                        operation = label,
                        attempt,
                        max_attempts = policy.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Transfer attempt failed, retrying"
                    );
                    metrics::TRANSFER_RETRIES_TOTAL
                        .with_label_values(&[label])
                        .inc();
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            },
        }
    }
}
