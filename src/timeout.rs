//! Per-attempt deadline enforcement.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::error::PolicyError;
use crate::outcome::Attempted;

/// Bounds each individual attempt by a fixed timeout.
///
/// An attempt that misses its deadline is dropped, so the work is cancelled at
/// its next suspension point and anything it still holds is released.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutGuard {
    timeout: Duration,
}

impl TimeoutGuard {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// The per-attempt deadline.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) async fn run<T, E, Fut>(&self, work: Fut) -> Attempted<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let result = match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => result.map_err(PolicyError::Operation),
            Err(_elapsed) => {
                debug!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "attempt timed out"
                );
                Err(PolicyError::Timeout(self.timeout))
            }
        };

        Attempted {
            result,
            elapsed: start.elapsed(),
        }
    }
}
