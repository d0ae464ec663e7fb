//! Built-in settings providers.

use std::str::FromStr;
use std::time::Duration;

use ahash::AHashMap;
use futures::future::{self, BoxFuture};
use serde::Deserialize;
use tracing::debug;

use crate::error::SettingsError;
use crate::request::CircuitRequest;
use crate::settings::{PolicySettings, SettingsProvider};

/// Tag holding a timeout override in milliseconds.
pub const TAG_TIMEOUT_MS: &str = "circuit.timeout_ms";
/// Tag holding a retry override.
pub const TAG_RETRY: &str = "circuit.retry";
/// Tag holding a bulkhead parallelism override.
pub const TAG_MAX_PARALLELIZATION: &str = "circuit.max_parallelization";
/// Tag holding a bulkhead queue override.
pub const TAG_MAX_QUEUING_ACTIONS: &str = "circuit.max_queuing_actions";
/// Tag holding a failure percentage override.
pub const TAG_FAILURE_PERCENT_THRESHOLD: &str = "circuit.failure_percent_threshold";
/// Tag holding a sampling window override in milliseconds.
pub const TAG_SAMPLING_DURATION_MS: &str = "circuit.sampling_duration_ms";
/// Tag holding a minimum throughput override.
pub const TAG_MINIMUM_THROUGHPUT: &str = "circuit.minimum_throughput";
/// Tag holding a break duration override in milliseconds.
pub const TAG_BREAK_DURATION_MS: &str = "circuit.break_duration_ms";
/// Tag that disables pipeline caching when set to `true`.
pub const TAG_DO_NOT_CACHE: &str = "circuit.do_not_cache";

/// Configuration section listing per-circuit policy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicySettingsConfig {
    /// One entry per circuit key or service name.
    pub policies: Vec<PolicySettingsEntry>,
}

/// Settings for one circuit key, with durations in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PolicySettingsEntry {
    /// Circuit key or service name the entry applies to.
    pub circuit_key: String,
    /// Per-attempt timeout.
    pub timeout_ms: Option<u64>,
    /// Retries after the first attempt.
    pub retry: Option<u32>,
    /// Concurrent executions admitted by the bulkhead.
    pub max_parallelization: Option<usize>,
    /// Callers allowed to wait for a bulkhead slot.
    pub max_queuing_actions: Option<usize>,
    /// Failure percentage that trips the circuit.
    pub failure_percent_threshold: Option<u32>,
    /// Rolling sampling window.
    pub sampling_duration_ms: Option<u64>,
    /// Samples needed before the circuit may trip.
    pub minimum_throughput: Option<u32>,
    /// Open duration once tripped.
    pub break_duration_ms: Option<u64>,
    /// Re-read settings on every call.
    pub do_not_cache: bool,
}

impl From<&PolicySettingsEntry> for PolicySettings {
    fn from(entry: &PolicySettingsEntry) -> Self {
        PolicySettings {
            timeout: entry.timeout_ms.map(Duration::from_millis),
            retry: entry.retry,
            max_parallelization: entry.max_parallelization,
            max_queuing_actions: entry.max_queuing_actions,
            failure_percent_threshold: entry.failure_percent_threshold,
            sampling_duration: entry.sampling_duration_ms.map(Duration::from_millis),
            minimum_throughput: entry.minimum_throughput,
            break_duration: entry.break_duration_ms.map(Duration::from_millis),
            do_not_cache: entry.do_not_cache,
        }
    }
}

/// Serves settings from a [`PolicySettingsConfig`], matching the circuit key
/// first and the service name second.
#[derive(Debug, Clone, Default)]
pub struct ConfigSettingsProvider {
    by_key: AHashMap<String, PolicySettings>,
}

impl ConfigSettingsProvider {
    /// Indexes `config`. When a key appears more than once the first entry wins.
    pub fn new(config: &PolicySettingsConfig) -> Self {
        let mut by_key = AHashMap::with_capacity(config.policies.len());
        for entry in &config.policies {
            by_key
                .entry(entry.circuit_key.clone())
                .or_insert_with(|| PolicySettings::from(entry));
        }
        Self { by_key }
    }

    fn lookup(&self, request: &CircuitRequest) -> Option<PolicySettings> {
        self.by_key
            .get(request.circuit_key())
            .or_else(|| self.by_key.get(request.service_name()))
            .cloned()
    }
}

impl SettingsProvider for ConfigSettingsProvider {
    fn name(&self) -> &str {
        "config"
    }

    fn resolve<'a>(
        &'a self,
        request: &'a CircuitRequest,
    ) -> BoxFuture<'a, Result<Option<PolicySettings>, SettingsError>> {
        Box::pin(future::ready(Ok(self.lookup(request))))
    }
}

/// Reads overrides attached to the request itself: the typed overrides first,
/// then the `circuit.*` string tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSettingsProvider;

impl ContextSettingsProvider {
    fn from_tags(request: &CircuitRequest) -> PolicySettings {
        PolicySettings {
            timeout: parse_tag(request, TAG_TIMEOUT_MS).map(Duration::from_millis),
            retry: parse_tag(request, TAG_RETRY),
            max_parallelization: parse_tag(request, TAG_MAX_PARALLELIZATION),
            max_queuing_actions: parse_tag(request, TAG_MAX_QUEUING_ACTIONS),
            failure_percent_threshold: parse_tag(request, TAG_FAILURE_PERCENT_THRESHOLD),
            sampling_duration: parse_tag(request, TAG_SAMPLING_DURATION_MS)
                .map(Duration::from_millis),
            minimum_throughput: parse_tag(request, TAG_MINIMUM_THROUGHPUT),
            break_duration: parse_tag(request, TAG_BREAK_DURATION_MS).map(Duration::from_millis),
            do_not_cache: parse_tag(request, TAG_DO_NOT_CACHE).unwrap_or(false),
        }
    }
}

fn parse_tag<T: FromStr>(request: &CircuitRequest, key: &str) -> Option<T> {
    let raw = request.context().tag(key)?.trim();
    if raw.is_empty() {
        return None;
    }
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            debug!(
                circuit_key = %request.circuit_key(),
                tag = key,
                value = raw,
                "ignoring unparsable settings tag"
            );
            None
        }
    }
}

impl SettingsProvider for ContextSettingsProvider {
    fn name(&self) -> &str {
        "context"
    }

    fn resolve<'a>(
        &'a self,
        request: &'a CircuitRequest,
    ) -> BoxFuture<'a, Result<Option<PolicySettings>, SettingsError>> {
        let settings = request
            .context()
            .overrides()
            .clone()
            .or(Self::from_tags(request));
        let settings = (!settings.is_empty()).then_some(settings);
        Box::pin(future::ready(Ok(settings)))
    }
}

/// Returns the same settings for every request.
#[derive(Debug, Clone, Default)]
pub struct StaticSettingsProvider {
    settings: PolicySettings,
}

impl StaticSettingsProvider {
    /// Serves `settings` for every circuit.
    pub fn new(settings: PolicySettings) -> Self {
        Self { settings }
    }
}

impl SettingsProvider for StaticSettingsProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn resolve<'a>(
        &'a self,
        _request: &'a CircuitRequest,
    ) -> BoxFuture<'a, Result<Option<PolicySettings>, SettingsError>> {
        Box::pin(future::ready(Ok(Some(self.settings.clone()))))
    }
}
