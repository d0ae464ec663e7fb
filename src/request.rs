//! Requests describing one protected call.

use std::time::Duration;

use ahash::AHashMap;

use crate::error::ArgumentError;
use crate::settings::PolicySettings;

/// Ambient data carried with a request: identity tags, typed policy overrides
/// and free-form string tags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CircuitContext {
    app_name: Option<String>,
    service_name: Option<String>,
    overrides: PolicySettings,
    tags: AHashMap<String, String>,
}

impl CircuitContext {
    /// Name of the calling application.
    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    /// Name of the downstream service being protected.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// Per-call policy overrides read by the context settings provider.
    pub fn overrides(&self) -> &PolicySettings {
        &self.overrides
    }

    /// Looks up a free-form tag.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// All free-form tags.
    pub fn tags(&self) -> &AHashMap<String, String> {
        &self.tags
    }
}

/// A request to run work under the policies of one circuit.
#[derive(Debug, Clone)]
pub struct CircuitRequest {
    circuit_key: String,
    request_id: Option<String>,
    timeout: Option<Duration>,
    retry: Option<u32>,
    context: CircuitContext,
}

impl CircuitRequest {
    /// Creates a request for `circuit_key` with no overrides.
    pub fn new(circuit_key: impl Into<String>) -> Self {
        Self {
            circuit_key: circuit_key.into(),
            request_id: None,
            timeout: None,
            retry: None,
            context: CircuitContext::default(),
        }
    }

    /// Starts building a request for `circuit_key`.
    pub fn builder(circuit_key: impl Into<String>) -> RequestBuilder {
        RequestBuilder {
            request: Self::new(circuit_key),
        }
    }

    /// Identifier of the protected operation.
    pub fn circuit_key(&self) -> &str {
        &self.circuit_key
    }

    /// Caller supplied correlation id.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Per-call timeout override. A zero timeout counts as unset.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.filter(|timeout| !timeout.is_zero())
    }

    /// Per-call retry override.
    pub fn retry(&self) -> Option<u32> {
        self.retry
    }

    /// Ambient context of the request.
    pub fn context(&self) -> &CircuitContext {
        &self.context
    }

    /// Application name, if known.
    pub fn app_name(&self) -> Option<&str> {
        self.context.app_name()
    }

    /// Service name, falling back to the circuit key.
    pub fn service_name(&self) -> &str {
        self.context
            .service_name()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.circuit_key)
    }

    pub(crate) fn validate(&self) -> Result<(), ArgumentError> {
        if self.circuit_key.trim().is_empty() {
            return Err(ArgumentError::MissingCircuitKey);
        }
        Ok(())
    }

    /// Fills in the app and service names when the caller left them blank.
    pub(crate) fn fill_defaults(&mut self, app_name: Option<&str>) {
        let blank = |value: &Option<String>| value.as_deref().map_or(true, |v| v.trim().is_empty());

        if blank(&self.context.app_name) {
            self.context.app_name = app_name.map(str::to_owned);
        }
        if blank(&self.context.service_name) {
            self.context.service_name = Some(self.circuit_key.clone());
        }
    }
}

/// Builder for [`CircuitRequest`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    request: CircuitRequest,
}

impl RequestBuilder {
    /// Sets the correlation id.
    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request.request_id = Some(id.into());
        self
    }

    /// Overrides the per-attempt timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.request.timeout = Some(timeout);
        self
    }

    /// Overrides the number of retries for this call.
    pub fn retry(mut self, retry: u32) -> Self {
        self.request.retry = Some(retry);
        self
    }

    /// Sets the calling application's name.
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.request.context.app_name = Some(name.into());
        self
    }

    /// Sets the protected service's name.
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.request.context.service_name = Some(name.into());
        self
    }

    /// Sets typed policy overrides for this call.
    pub fn overrides(mut self, overrides: PolicySettings) -> Self {
        self.request.context.overrides = overrides;
        self
    }

    /// Adds a free-form tag.
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.context.tags.insert(key.into(), value.into());
        self
    }

    /// Finishes the request.
    pub fn build(self) -> CircuitRequest {
        self.request
    }
}
