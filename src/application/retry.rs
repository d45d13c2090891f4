//! Bounded retry for store writes driven by billing webhooks.
//!
//! Only transient `DomainError`s (database contention, timeouts) are retried.
//! Delays double from the base: with a 2s base and 3 retries, 2s, 4s and 8s.

use std::future::Future;
use std::time::Duration;

use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;

use crate::domain::foundation::DomainError;

/// Retry schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: usize, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    /// Same number of retries without waiting, for tests.
    pub fn immediate(max_retries: usize) -> Self {
        Self::new(max_retries, 0)
    }

    /// The delay before each retry.
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // from_millis(2) yields 2, 4, 8, ... so the factor scales that to base, 2*base, 4*base.
        ExponentialBackoff::from_millis(2)
            .factor(self.base_delay_ms / 2)
            .take(self.max_retries)
    }
}

/// Outcome of a retried operation that still failed.
#[derive(Debug, Clone)]
pub struct RetryFailure {
    pub error: DomainError,
    /// True when the last error was transient, i.e. the retry budget ran out.
    pub exhausted: bool,
}

/// Runs `action`, retrying transient failures per `policy`.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &'static str,
    action: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DomainError>>,
{
    let mut attempt = 0usize;
    let max_retries = policy.max_retries;

    RetryIf::spawn(policy.delays(), action, |err: &DomainError| {
        attempt += 1;
        if !err.is_transient() {
            return false;
        }
        if attempt <= max_retries {
            tracing::warn!(
                operation,
                attempt,
                max_retries,
                error = %err,
                "Transient store error, retrying"
            );
        }
        true
    })
    .await
    .map_err(|error| {
        let exhausted = error.is_transient();
        if exhausted {
            tracing::error!(operation, error = %error, "Retries exhausted");
        }
        RetryFailure { error, exhausted }
    })
}
