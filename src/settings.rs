//! Policy settings and their resolution from an ordered list of providers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tracing::{trace, warn};

use crate::error::SettingsError;
use crate::request::CircuitRequest;

/// Per-attempt timeout applied when nothing else is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Retries applied when nothing else is configured.
pub const DEFAULT_RETRY: u32 = 0;
/// Concurrent executions allowed per circuit by default.
pub const DEFAULT_MAX_PARALLELIZATION: usize = 100;
/// Waiters allowed to queue for a bulkhead slot by default.
pub const DEFAULT_MAX_QUEUING_ACTIONS: usize = 10;
/// Failure percentage that trips a circuit by default.
pub const DEFAULT_FAILURE_PERCENT_THRESHOLD: u32 = 50;
/// Rolling window over which failures are sampled by default.
pub const DEFAULT_SAMPLING_DURATION: Duration = Duration::from_millis(1000);
/// Samples required in the window before a circuit may trip.
pub const DEFAULT_MINIMUM_THROUGHPUT: u32 = 5;
/// How long a tripped circuit stays open by default.
pub const DEFAULT_BREAK_DURATION: Duration = Duration::from_millis(500);

/// Partially specified policy settings, as produced by a [`SettingsProvider`]
/// or attached to a request as overrides.
///
/// Absent fields fall back to the built-in defaults during resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySettings {
    /// Per-attempt timeout.
    pub timeout: Option<Duration>,
    /// Number of retries after the first attempt.
    pub retry: Option<u32>,
    /// Concurrent executions admitted by the bulkhead.
    pub max_parallelization: Option<usize>,
    /// Callers allowed to wait for a bulkhead slot.
    pub max_queuing_actions: Option<usize>,
    /// Failure percentage (1-100) that trips the circuit.
    pub failure_percent_threshold: Option<u32>,
    /// Rolling window for failure sampling.
    pub sampling_duration: Option<Duration>,
    /// Samples needed in the window before the circuit may trip.
    pub minimum_throughput: Option<u32>,
    /// How long the circuit stays open once tripped.
    pub break_duration: Option<Duration>,
    /// Skip pipeline caching so settings are read again on the next call.
    pub do_not_cache: bool,
}

impl PolicySettings {
    /// True when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Fills every unset field of `self` from `fallback`.
    pub fn or(self, fallback: PolicySettings) -> PolicySettings {
        PolicySettings {
            timeout: self.timeout.or(fallback.timeout),
            retry: self.retry.or(fallback.retry),
            max_parallelization: self.max_parallelization.or(fallback.max_parallelization),
            max_queuing_actions: self.max_queuing_actions.or(fallback.max_queuing_actions),
            failure_percent_threshold: self
                .failure_percent_threshold
                .or(fallback.failure_percent_threshold),
            sampling_duration: self.sampling_duration.or(fallback.sampling_duration),
            minimum_throughput: self.minimum_throughput.or(fallback.minimum_throughput),
            break_duration: self.break_duration.or(fallback.break_duration),
            do_not_cache: self.do_not_cache || fallback.do_not_cache,
        }
    }
}

/// Fully resolved settings used to build one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectiveSettings {
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry: u32,
    /// Concurrent executions admitted by the bulkhead.
    pub max_parallelization: usize,
    /// Callers allowed to wait for a bulkhead slot.
    pub max_queuing_actions: usize,
    /// Failure percentage (1-100) that trips the circuit.
    pub failure_percent_threshold: u32,
    /// Rolling window for failure sampling.
    pub sampling_duration: Duration,
    /// Samples needed in the window before the circuit may trip.
    pub minimum_throughput: u32,
    /// How long the circuit stays open once tripped.
    pub break_duration: Duration,
    /// The pipeline built from these settings must not be cached.
    pub do_not_cache: bool,
}

impl Default for EffectiveSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            retry: DEFAULT_RETRY,
            max_parallelization: DEFAULT_MAX_PARALLELIZATION,
            max_queuing_actions: DEFAULT_MAX_QUEUING_ACTIONS,
            failure_percent_threshold: DEFAULT_FAILURE_PERCENT_THRESHOLD,
            sampling_duration: DEFAULT_SAMPLING_DURATION,
            minimum_throughput: DEFAULT_MINIMUM_THROUGHPUT,
            break_duration: DEFAULT_BREAK_DURATION,
            do_not_cache: false,
        }
    }
}

impl EffectiveSettings {
    /// Merges request overrides, provider settings and defaults.
    ///
    /// Request-level retry and timeout always win. A zero value counts as unset,
    /// except for `retry` and `max_queuing_actions` where zero is meaningful.
    pub fn resolve(request: &CircuitRequest, settings: Option<&PolicySettings>) -> Self {
        let empty = PolicySettings::default();
        let settings = settings.unwrap_or(&empty);

        Self {
            timeout: request
                .timeout()
                .or(settings.timeout)
                .filter(|timeout| !timeout.is_zero())
                .unwrap_or(DEFAULT_TIMEOUT),
            retry: request.retry().or(settings.retry).unwrap_or(DEFAULT_RETRY),
            max_parallelization: settings
                .max_parallelization
                .filter(|max| *max > 0)
                .unwrap_or(DEFAULT_MAX_PARALLELIZATION),
            max_queuing_actions: settings
                .max_queuing_actions
                .unwrap_or(DEFAULT_MAX_QUEUING_ACTIONS),
            failure_percent_threshold: settings
                .failure_percent_threshold
                .filter(|percent| *percent > 0)
                .unwrap_or(DEFAULT_FAILURE_PERCENT_THRESHOLD)
                .min(100),
            sampling_duration: settings
                .sampling_duration
                .filter(|duration| !duration.is_zero())
                .unwrap_or(DEFAULT_SAMPLING_DURATION),
            minimum_throughput: settings
                .minimum_throughput
                .filter(|min| *min > 0)
                .unwrap_or(DEFAULT_MINIMUM_THROUGHPUT),
            break_duration: settings
                .break_duration
                .filter(|duration| !duration.is_zero())
                .unwrap_or(DEFAULT_BREAK_DURATION),
            do_not_cache: settings.do_not_cache,
        }
    }

    /// Failure threshold as a ratio in `0.0..=1.0`.
    pub fn failure_ratio(&self) -> f64 {
        f64::from(self.failure_percent_threshold) / 100.0
    }
}

/// Source of policy settings for a request.
///
/// Providers are consulted in registration order; the first one returning
/// `Some` decides the settings for the request.
pub trait SettingsProvider: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Looks up settings for `request`, or `None` if this provider has nothing for it.
    fn resolve<'a>(
        &'a self,
        request: &'a CircuitRequest,
    ) -> BoxFuture<'a, Result<Option<PolicySettings>, SettingsError>>;
}

/// Resolves [`EffectiveSettings`] by querying providers in order.
#[derive(Clone, Default)]
pub struct SettingsResolver {
    providers: Vec<Arc<dyn SettingsProvider>>,
}

impl fmt::Debug for SettingsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.providers.iter().map(|provider| provider.name()))
            .finish()
    }
}

impl SettingsResolver {
    /// Creates a resolver with no providers; every request resolves to defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a provider to the end of the lookup order.
    pub fn with_provider<P: SettingsProvider>(mut self, provider: P) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Appends a shared provider to the end of the lookup order.
    pub fn push(&mut self, provider: Arc<dyn SettingsProvider>) {
        self.providers.push(provider);
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// True when no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Resolves the effective settings for `request`.
    ///
    /// A failing provider is skipped and forces `do_not_cache`, so the next call
    /// gets another chance at the settings it would have supplied.
    pub async fn resolve(&self, request: &CircuitRequest) -> EffectiveSettings {
        let mut provider_failed = false;
        let mut found = None;

        for provider in &self.providers {
            match provider.resolve(request).await {
                Ok(Some(settings)) => {
                    trace!(
                        provider = provider.name(),
                        circuit_key = %request.circuit_key(),
                        "settings provider matched"
                    );
                    found = Some(settings);
                    break;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        provider = provider.name(),
                        circuit_key = %request.circuit_key(),
                        error = %err,
                        "settings provider failed, skipping"
                    );
                    provider_failed = true;
                }
            }
        }

        let mut settings = EffectiveSettings::resolve(request, found.as_ref());
        settings.do_not_cache |= provider_failed;

        trace!(
            request_id = request.request_id().unwrap_or_default(),
            app_name = request.app_name().unwrap_or_default(),
            service_name = %request.service_name(),
            circuit_key = %request.circuit_key(),
            request_retry = ?request.retry(),
            request_timeout = ?request.timeout(),
            timeout = ?settings.timeout,
            retry = settings.retry,
            failure_percent_threshold = settings.failure_percent_threshold,
            sampling_duration = ?settings.sampling_duration,
            minimum_throughput = settings.minimum_throughput,
            break_duration = ?settings.break_duration,
            max_parallelization = settings.max_parallelization,
            max_queuing_actions = settings.max_queuing_actions,
            "resolved policy settings"
        );

        settings
    }
}
