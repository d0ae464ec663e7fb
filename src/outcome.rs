//! Outcome classification and responses.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;

/// Terminal status of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The work completed successfully.
    Succeed,
    /// The work failed, retries were exhausted, or the bulkhead was full.
    Failed,
    /// The last attempt exceeded its timeout.
    Timeout,
    /// The circuit was open and the work was never attempted.
    Broken,
}

impl Outcome {
    /// Name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Succeed => "Succeed",
            Outcome::Failed => "Failed",
            Outcome::Timeout => "Timeout",
            Outcome::Broken => "Broken",
        }
    }

    /// Maps a pipeline result onto the four-way status.
    pub fn classify<T, E>(result: &Result<T, PolicyError<E>>) -> Self {
        match result {
            Ok(_) => Outcome::Succeed,
            Err(PolicyError::Timeout(_)) => Outcome::Timeout,
            Err(PolicyError::BrokenCircuit) => Outcome::Broken,
            Err(PolicyError::BulkheadRejected) | Err(PolicyError::Operation(_)) => Outcome::Failed,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of [`CircuitEngine::execute`](crate::CircuitEngine::execute).
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitResponse<T> {
    status: Outcome,
    value: Option<T>,
    execution_time: Duration,
}

impl<T> CircuitResponse<T> {
    pub(crate) fn new(status: Outcome, value: Option<T>, execution_time: Duration) -> Self {
        Self {
            status,
            value,
            execution_time,
        }
    }

    /// Final status of the execution.
    pub fn status(&self) -> Outcome {
        self.status
    }

    /// True when the status is [`Outcome::Succeed`].
    pub fn is_succeed(&self) -> bool {
        self.status == Outcome::Succeed
    }

    /// The value produced by the work, present only on success.
    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Consumes the response, returning the value if the work succeeded.
    pub fn into_value(self) -> Option<T> {
        self.value
    }

    /// Duration of the last attempt, zero if the work never ran.
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }
}

/// One attempt's result together with its measured duration.
#[derive(Debug)]
pub(crate) struct Attempted<T, E> {
    pub(crate) result: Result<T, PolicyError<E>>,
    pub(crate) elapsed: Duration,
}

impl<T, E> Attempted<T, E> {
    pub(crate) fn rejected(error: PolicyError<E>) -> Self {
        Self {
            result: Err(error),
            elapsed: Duration::ZERO,
        }
    }
}
