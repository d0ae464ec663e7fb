//! # circuitpolicy-rs
//!
//! Per-circuit resilience pipelines for async Rust: circuit breaking, bulkhead
//! isolation, bounded retries and per-attempt timeouts, with pluggable settings
//! sources and outcome listeners.
//!
//! Every call names a *circuit key* identifying the protected dependency. The
//! engine resolves settings for that circuit once, builds a pipeline and reuses
//! it for later calls with the same key and overrides. Work runs through the
//! policies in a fixed order:
//!
//! - **Circuit breaker**: rejects immediately while the dependency is unhealthy.
//! - **Bulkhead**: bounds concurrent executions and the queue in front of them.
//! - **Retry**: re-runs failed or timed out attempts.
//! - **Timeout**: bounds each attempt.
//!
//! The caller always gets a [`CircuitResponse`] with one of four statuses:
//! [`Outcome::Succeed`], [`Outcome::Failed`], [`Outcome::Timeout`] or
//! [`Outcome::Broken`].
//!
//! ## Basic Usage
//!
//! ```rust
//! use circuitpolicy_rs::{CircuitEngine, CircuitRequest, ContextSettingsProvider, Outcome};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let engine = CircuitEngine::builder()
//!     .provider(ContextSettingsProvider)
//!     .app_name("web-bookworm")
//!     .build();
//!
//! let request = CircuitRequest::builder("api-books")
//!     .request_id("req-1")
//!     .timeout(Duration::from_secs(2))
//!     .retry(1)
//!     .build();
//!
//! let response = engine
//!     .execute(request, |_attempt| async {
//!         Ok::<_, std::io::Error>("books".to_string())
//!     })
//!     .await
//!     .expect("circuit key is set");
//!
//! assert_eq!(response.status(), Outcome::Succeed);
//! assert_eq!(response.value().map(String::as_str), Some("books"));
//! # }
//! ```
//!
//! ## Settings
//!
//! Settings come from an ordered list of [`SettingsProvider`]s; the first one
//! that knows the circuit wins and built-in defaults fill the gaps. Request
//! level retry and timeout overrides always take precedence.
//!
//! ## Features
//!
//! - `prometheus` - Prometheus status listener

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod breaker;
mod bulkhead;
mod cache;
mod engine;
mod error;
mod hook;
mod listener;
#[cfg(feature = "prometheus")]
mod metrics;
mod outcome;
mod pipeline;
pub mod prelude;
mod provider;
mod request;
mod retry;
mod settings;
mod state;
mod timeout;
mod window;

// Re-exports
pub use breaker::CircuitBreaker;
pub use bulkhead::Bulkhead;
pub use cache::{Fingerprint, PolicyCache};
pub use engine::{CircuitEngine, EngineBuilder, EngineOptions};
pub use error::{ArgumentError, BoxError, ListenerError, PolicyError, SettingsError};
pub use hook::HookRegistry;
pub use listener::{StatusListener, StatusSnapshot, TracingListener};
#[cfg(feature = "prometheus")]
#[cfg_attr(docsrs, doc(cfg(feature = "prometheus")))]
pub use metrics::PrometheusListener;
pub use outcome::{CircuitResponse, Outcome};
pub use pipeline::{Attempt, Pipeline};
pub use provider::{
    ConfigSettingsProvider, ContextSettingsProvider, PolicySettingsConfig, PolicySettingsEntry,
    StaticSettingsProvider, TAG_BREAK_DURATION_MS, TAG_DO_NOT_CACHE,
    TAG_FAILURE_PERCENT_THRESHOLD, TAG_MAX_PARALLELIZATION, TAG_MAX_QUEUING_ACTIONS,
    TAG_MINIMUM_THROUGHPUT, TAG_RETRY, TAG_SAMPLING_DURATION_MS, TAG_TIMEOUT_MS,
};
pub use request::{CircuitContext, CircuitRequest, RequestBuilder};
pub use retry::RetryPolicy;
pub use settings::{
    EffectiveSettings, PolicySettings, SettingsProvider, SettingsResolver, DEFAULT_BREAK_DURATION,
    DEFAULT_FAILURE_PERCENT_THRESHOLD, DEFAULT_MAX_PARALLELIZATION, DEFAULT_MAX_QUEUING_ACTIONS,
    DEFAULT_MINIMUM_THROUGHPUT, DEFAULT_RETRY, DEFAULT_SAMPLING_DURATION, DEFAULT_TIMEOUT,
};
pub use state::State;
pub use timeout::TimeoutGuard;
pub use window::HealthInfo;
