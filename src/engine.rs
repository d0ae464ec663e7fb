//! The execution engine that runs work through per-circuit pipelines.

use std::fmt::{self, Display};
use std::future::Future;
use std::sync::Arc;

use once_cell::sync::Lazy;
use tokio::time::Instant;
use tracing::{error, trace};

use crate::cache::PolicyCache;
use crate::error::{ArgumentError, PolicyError};
use crate::hook::HookRegistry;
use crate::listener::{StatusListener, StatusSnapshot, Telemetry};
use crate::outcome::{Attempted, CircuitResponse, Outcome};
use crate::pipeline::Attempt;
use crate::request::CircuitRequest;
use crate::settings::{SettingsProvider, SettingsResolver};

static EXECUTABLE_NAME: Lazy<Option<String>> = Lazy::new(|| {
    std::env::current_exe()
        .ok()
        .and_then(|path| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
});

/// Engine-wide options, deserializable from any configuration source.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// When false, work runs once with no policies applied.
    pub enabled: bool,
    /// App name stamped on requests that carry none. Defaults to the
    /// executable's file name.
    pub app_name: Option<String>,
    /// Spawn listener delivery instead of awaiting it before returning.
    pub detach_notifications: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            app_name: None,
            detach_notifications: false,
        }
    }
}

/// Runs asynchronous work under circuit breaker, bulkhead, retry and timeout
/// policies and reports every outcome to the registered listeners.
pub struct CircuitEngine {
    cache: Arc<PolicyCache>,
    telemetry: Telemetry,
    app_name: Option<String>,
    enabled: bool,
}

impl fmt::Debug for CircuitEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitEngine")
            .field("enabled", &self.enabled)
            .field("app_name", &self.app_name)
            .field("listeners", &self.telemetry.listener_count())
            .field("pipelines", &self.cache.len())
            .finish()
    }
}

impl CircuitEngine {
    /// Creates a new builder for customizing an engine.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// The pipeline cache backing this engine.
    pub fn cache(&self) -> &Arc<PolicyCache> {
        &self.cache
    }

    /// Whether policies are applied.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Executes `work` under the policies of the request's circuit.
    ///
    /// `work` is called once per attempt. The only error returned is an
    /// [`ArgumentError`] for an invalid request; every runtime failure is
    /// reported through the response status instead.
    ///
    /// Dropping the returned future cancels the running attempt and any
    /// pending retries.
    pub async fn execute<T, E, F, Fut>(
        &self,
        request: CircuitRequest,
        mut work: F,
    ) -> Result<CircuitResponse<T>, ArgumentError>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        request.validate()?;

        let mut request = request;
        request.fill_defaults(self.app_name.as_deref());
        let request = Arc::new(request);

        let attempted = if self.enabled {
            let pipeline = self.cache.get_pipeline(&request).await;
            pipeline.execute(&request, work).await
        } else {
            let start = Instant::now();
            let result = work(Attempt::new(&request, 1))
                .await
                .map_err(PolicyError::Operation);
            Attempted {
                result,
                elapsed: start.elapsed(),
            }
        };

        let status = Outcome::classify(&attempted.result);
        Self::log_outcome(&request, status, &attempted);

        let response = CircuitResponse::new(status, attempted.result.ok(), attempted.elapsed);

        if self.telemetry.has_listeners() {
            let snapshot = StatusSnapshot::new(&request, status, response.execution_time());
            self.telemetry.publish(snapshot).await;
        }

        Ok(response)
    }

    fn log_outcome<T, E: Display>(
        request: &CircuitRequest,
        status: Outcome,
        attempted: &Attempted<T, E>,
    ) {
        let execution_time_ms = attempted.elapsed.as_secs_f64() * 1000.0;
        match &attempted.result {
            Err(err) if status == Outcome::Failed => error!(
                request_id = request.request_id().unwrap_or_default(),
                circuit_key = %request.circuit_key(),
                status = %status,
                execution_time_ms,
                error = %err,
                "circuit execution failed"
            ),
            Err(err) => trace!(
                request_id = request.request_id().unwrap_or_default(),
                circuit_key = %request.circuit_key(),
                status = %status,
                execution_time_ms,
                error = %err,
                "circuit execution finished"
            ),
            Ok(_) => trace!(
                request_id = request.request_id().unwrap_or_default(),
                circuit_key = %request.circuit_key(),
                status = %status,
                execution_time_ms,
                "circuit execution finished"
            ),
        }
    }
}

/// Builder for [`CircuitEngine`].
pub struct EngineBuilder {
    resolver: SettingsResolver,
    listeners: Vec<Arc<dyn StatusListener>>,
    hooks: HookRegistry,
    options: EngineOptions,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    /// Creates a new builder with default options and no providers or listeners.
    pub fn new() -> Self {
        Self {
            resolver: SettingsResolver::new(),
            listeners: Vec::new(),
            hooks: HookRegistry::new(),
            options: EngineOptions::default(),
        }
    }

    /// Appends a settings provider; providers are queried in the order added.
    pub fn provider<P: SettingsProvider>(mut self, provider: P) -> Self {
        self.resolver = self.resolver.with_provider(provider);
        self
    }

    /// Appends a shared settings provider.
    pub fn shared_provider(mut self, provider: Arc<dyn SettingsProvider>) -> Self {
        self.resolver.push(provider);
        self
    }

    /// Registers a status listener.
    pub fn listener<L: StatusListener>(mut self, listener: L) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    /// Registers a shared status listener.
    pub fn shared_listener(mut self, listener: Arc<dyn StatusListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Sets the state transition hooks shared by all circuits.
    pub fn hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    /// Replaces all options at once.
    pub fn options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Enables or disables policy enforcement.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.options.enabled = enabled;
        self
    }

    /// Sets the app name stamped on requests that carry none.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.options.app_name = Some(name.into());
        self
    }

    /// Spawns listener delivery instead of awaiting it.
    pub fn detach_notifications(mut self, detach: bool) -> Self {
        self.options.detach_notifications = detach;
        self
    }

    /// Builds an engine with its own pipeline cache.
    pub fn build(self) -> CircuitEngine {
        let cache = Arc::new(PolicyCache::with_hooks(self.resolver, Arc::new(self.hooks)));
        Self::assemble(cache, self.listeners, self.options)
    }

    /// Builds an engine on top of an existing cache, sharing its pipelines.
    ///
    /// Providers and hooks set on this builder are ignored; the cache already
    /// owns its own.
    pub fn build_with_cache(self, cache: Arc<PolicyCache>) -> CircuitEngine {
        Self::assemble(cache, self.listeners, self.options)
    }

    fn assemble(
        cache: Arc<PolicyCache>,
        listeners: Vec<Arc<dyn StatusListener>>,
        options: EngineOptions,
    ) -> CircuitEngine {
        let app_name = options
            .app_name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| EXECUTABLE_NAME.clone());

        CircuitEngine {
            cache,
            telemetry: Telemetry::new(listeners, options.detach_notifications),
            app_name,
            enabled: options.enabled,
        }
    }
}
