//! Error types for the circuit policy engine.

use std::error::Error;
use std::time::Duration;

/// Boxed error used as the source of provider and listener failures.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Errors raised before a request enters its pipeline.
///
/// These are the only errors [`CircuitEngine::execute`](crate::CircuitEngine::execute)
/// ever returns; every other failure is folded into the response status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArgumentError {
    /// The request carried an empty or whitespace-only circuit key.
    #[error("circuit key must not be empty")]
    MissingCircuitKey,
}

/// Failure reported by one layer of a resilience pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError<E> {
    /// The circuit breaker rejected the call without attempting it.
    #[error("circuit is open")]
    BrokenCircuit,

    /// The bulkhead had no free slot and no room in its queue.
    #[error("bulkhead capacity exceeded")]
    BulkheadRejected,

    /// An attempt did not finish within the configured timeout.
    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The protected work itself failed.
    #[error("operation error: {0}")]
    Operation(E),
}

impl<E> PolicyError<E> {
    /// Whether the retry layer may run another attempt after this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PolicyError::Timeout(_) | PolicyError::Operation(_))
    }
}

/// A settings provider failed to produce settings.
#[derive(Debug, thiserror::Error)]
#[error("settings provider failed: {message}")]
pub struct SettingsError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl SettingsError {
    /// Creates an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// A status listener failed to process a snapshot.
#[derive(Debug, thiserror::Error)]
#[error("status listener failed: {message}")]
pub struct ListenerError {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ListenerError {
    /// Creates an error with a message only.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an error wrapping an underlying cause.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}
