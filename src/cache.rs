//! Single-flight memoization of pipelines.

use std::sync::Arc;
use std::time::Duration;

use ahash::RandomState;
use dashmap::DashMap;
use smallvec::SmallVec;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::hook::HookRegistry;
use crate::pipeline::Pipeline;
use crate::request::CircuitRequest;
use crate::settings::SettingsResolver;

/// Identifies a cached pipeline: the circuit key plus the request-level retry
/// and timeout overrides, which take precedence over any resolved setting.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    circuit_key: Arc<str>,
    retry: Option<u32>,
    timeout: Option<Duration>,
}

impl Fingerprint {
    /// Computes the fingerprint of `request`.
    pub fn of(request: &CircuitRequest) -> Self {
        Self {
            circuit_key: Arc::from(request.circuit_key()),
            retry: request.retry(),
            timeout: request.timeout(),
        }
    }

    /// Circuit key part of the fingerprint.
    pub fn circuit_key(&self) -> &str {
        &self.circuit_key
    }

    /// Retry override part of the fingerprint.
    pub fn retry(&self) -> Option<u32> {
        self.retry
    }

    /// Timeout override part of the fingerprint.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Pipelines sharing a circuit key, one per distinct pair of request overrides.
#[derive(Debug, Default)]
struct Variants(SmallVec<[Variant; 2]>);

#[derive(Debug)]
struct Variant {
    retry: Option<u32>,
    timeout: Option<Duration>,
    pipeline: Arc<Pipeline>,
}

impl Variants {
    fn find(&self, retry: Option<u32>, timeout: Option<Duration>) -> Option<Arc<Pipeline>> {
        self.0
            .iter()
            .find(|variant| variant.retry == retry && variant.timeout == timeout)
            .map(|variant| Arc::clone(&variant.pipeline))
    }
}

/// Builds and memoizes one [`Pipeline`] per [`Fingerprint`].
///
/// Pipelines are indexed by circuit key first, so lookups borrow the request's
/// key and allocate nothing on a hit. Lookups are lock-free. Misses serialize
/// on a single construction lock and re-check the map, so a fingerprint is
/// built at most once no matter how many callers miss concurrently. The first pipeline stored for a fingerprint is
/// kept for the life of the cache, even if later requests would resolve
/// different bulkhead or breaker settings.
#[derive(Debug)]
pub struct PolicyCache {
    pipelines: DashMap<Arc<str>, Variants, RandomState>,
    build_lock: Mutex<()>,
    resolver: SettingsResolver,
    hooks: Arc<HookRegistry>,
}

impl PolicyCache {
    /// Creates an empty cache resolving settings through `resolver`.
    pub fn new(resolver: SettingsResolver) -> Self {
        Self::with_hooks(resolver, Arc::new(HookRegistry::new()))
    }

    /// Creates an empty cache whose breakers report transitions to `hooks`.
    pub fn with_hooks(resolver: SettingsResolver, hooks: Arc<HookRegistry>) -> Self {
        Self {
            pipelines: DashMap::with_hasher(RandomState::new()),
            build_lock: Mutex::new(()),
            resolver,
            hooks,
        }
    }

    /// Returns the pipeline for `request`, building it on first use.
    pub async fn get_pipeline(&self, request: &CircuitRequest) -> Arc<Pipeline> {
        let (circuit_key, retry, timeout) =
            (request.circuit_key(), request.retry(), request.timeout());

        if let Some(pipeline) = self.lookup(circuit_key, retry, timeout) {
            return pipeline;
        }

        let _guard = self.build_lock.lock().await;

        if let Some(pipeline) = self.lookup(circuit_key, retry, timeout) {
            return pipeline;
        }

        let fingerprint = Fingerprint::of(request);

        debug!(
            circuit_key = %fingerprint.circuit_key,
            retry = ?fingerprint.retry,
            timeout = ?fingerprint.timeout,
            "building pipeline"
        );

        let settings = self.resolver.resolve(request).await;
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&fingerprint.circuit_key),
            settings,
            Arc::clone(&self.hooks),
        ));

        if settings.do_not_cache {
            warn!(
                circuit_key = %fingerprint.circuit_key,
                "settings asked to be reloaded, pipeline not cached"
            );
        } else {
            self.pipelines
                .entry(Arc::clone(&fingerprint.circuit_key))
                .or_default()
                .0
                .push(Variant {
                    retry: fingerprint.retry,
                    timeout: fingerprint.timeout,
                    pipeline: Arc::clone(&pipeline),
                });
        }

        pipeline
    }

    /// Returns the cached pipeline for `fingerprint`, if any.
    pub fn cached(&self, fingerprint: &Fingerprint) -> Option<Arc<Pipeline>> {
        self.lookup(&fingerprint.circuit_key, fingerprint.retry, fingerprint.timeout)
    }

    fn lookup(
        &self,
        circuit_key: &str,
        retry: Option<u32>,
        timeout: Option<Duration>,
    ) -> Option<Arc<Pipeline>> {
        self.pipelines
            .get(circuit_key)
            .and_then(|entry| entry.value().find(retry, timeout))
    }

    /// Number of cached pipelines.
    pub fn len(&self) -> usize {
        self.pipelines.iter().map(|entry| entry.value().0.len()).sum()
    }

    /// True when nothing has been cached yet.
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// The resolver used on cache misses.
    pub fn resolver(&self) -> &SettingsResolver {
        &self.resolver
    }
}
