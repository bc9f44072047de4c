//! Bounded retry with exponential backoff for store operations.
//!
//! Only errors reporting [`Error::is_transient`] are retried. Everything else
//! fails on the first attempt.
//!
//! [`Error::is_transient`]: crate::Error::is_transient

use crate::Result;
use eventum_core::metrics::increment_labeled;
use std::future::Future;
use std::time::Duration;

/// Retry policy for staging, persist and cleanup calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `1` disables retries.
    pub max_attempts: u32,

    /// Delay before the second attempt.
    pub initial_backoff: Duration,

    /// Upper bound for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after the given failed attempt (1-based): doubles each time, capped.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }

    /// Run `op`, retrying transient failures until attempts run out.
    pub async fn run<T, F, Fut>(&self, op_name: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        op = op_name,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient store error, retrying"
                    );
                    increment_labeled("store_retries_total", "op", op_name, 1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
