//! The composed resilience pipeline for one fingerprint.

use std::future::Future;
use std::sync::Arc;

use crate::breaker::CircuitBreaker;
use crate::bulkhead::Bulkhead;
use crate::error::PolicyError;
use crate::hook::HookRegistry;
use crate::outcome::Attempted;
use crate::request::CircuitRequest;
use crate::retry::RetryPolicy;
use crate::settings::EffectiveSettings;
use crate::timeout::TimeoutGuard;

/// Passed to the work function on every attempt.
#[derive(Debug, Clone)]
pub struct Attempt {
    request: Arc<CircuitRequest>,
    number: u32,
}

impl Attempt {
    pub(crate) fn new(request: &Arc<CircuitRequest>, number: u32) -> Self {
        Self {
            request: Arc::clone(request),
            number,
        }
    }

    /// The request being executed.
    pub fn request(&self) -> &CircuitRequest {
        &self.request
    }

    /// 1-based attempt number; anything above 1 is a retry.
    pub fn number(&self) -> u32 {
        self.number
    }

    /// True for every attempt after the first.
    pub fn is_retry(&self) -> bool {
        self.number > 1
    }
}

/// Circuit breaker, bulkhead, retry and timeout built from one set of settings.
///
/// Policies nest outermost first: an open circuit rejects before a bulkhead
/// slot is taken, the slot is held across all retries, and each attempt gets
/// its own timeout. The breaker samples the final result of each execution.
#[derive(Debug)]
pub struct Pipeline {
    settings: EffectiveSettings,
    breaker: CircuitBreaker,
    bulkhead: Bulkhead,
    retry: RetryPolicy,
    timeout: TimeoutGuard,
}

impl Pipeline {
    pub(crate) fn new(
        circuit_key: Arc<str>,
        settings: EffectiveSettings,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            breaker: CircuitBreaker::new(circuit_key, &settings, hooks),
            bulkhead: Bulkhead::new(settings.max_parallelization, settings.max_queuing_actions),
            retry: RetryPolicy::new(settings.retry),
            timeout: TimeoutGuard::new(settings.timeout),
            settings,
        }
    }

    /// Settings this pipeline was built from.
    pub fn settings(&self) -> &EffectiveSettings {
        &self.settings
    }

    /// The pipeline's circuit breaker.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// The pipeline's bulkhead.
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    /// The pipeline's retry policy.
    pub fn retry(&self) -> &RetryPolicy {
        &self.retry
    }

    /// The pipeline's timeout guard.
    pub fn timeout(&self) -> &TimeoutGuard {
        &self.timeout
    }

    pub(crate) async fn execute<T, E, F, Fut>(
        &self,
        request: &Arc<CircuitRequest>,
        mut work: F,
    ) -> Attempted<T, E>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(permit) = self.breaker.enter() else {
            return Attempted::rejected(PolicyError::BrokenCircuit);
        };

        let attempted = match self.bulkhead.acquire().await {
            Ok(_slot) => {
                self.retry
                    .run(|number| self.timeout.run(work(Attempt::new(request, number))))
                    .await
            }
            Err(_full) => Attempted::rejected(PolicyError::BulkheadRejected),
        };

        permit.record(attempted.result.is_ok());
        attempted
    }
}
