//! Immediate bounded retries.

use std::future::Future;

use tracing::debug;

use crate::outcome::{Attempted, Outcome};

/// Re-runs a failed or timed out attempt up to `retry` more times, with no
/// delay between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    retry: u32,
}

impl RetryPolicy {
    pub(crate) fn new(retry: u32) -> Self {
        Self { retry }
    }

    /// Retries allowed after the first attempt.
    pub fn retry(&self) -> u32 {
        self.retry
    }

    /// Runs `attempt` with 1-based attempt numbers until it succeeds, fails with
    /// a non-retryable error or runs out of retries. Returns the last attempt.
    pub(crate) async fn run<T, E, F, Fut>(&self, mut attempt: F) -> Attempted<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempted<T, E>>,
    {
        let mut number = 1_u32;
        loop {
            let attempted = attempt(number).await;
            let retryable = matches!(&attempted.result, Err(err) if err.is_retryable());
            if !retryable || number > self.retry {
                return attempted;
            }

            debug!(
                attempt = number,
                remaining = self.retry - number + 1,
                failure = %Outcome::classify(&attempted.result),
                "attempt failed, retrying"
            );
            number = number.saturating_add(1);
        }
    }
}
