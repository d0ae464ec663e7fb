//! Circuit breaker states.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use tokio::time::Instant;

/// Represents the possible states of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Circuit is closed and operations are allowed.
    Closed = 0,

    /// Circuit is open and operations are rejected.
    Open = 1,

    /// Circuit is admitting a single trial call to test recovery.
    HalfOpen = 2,
}

impl State {
    /// Lowercase name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            State::Closed => "closed",
            State::Open => "open",
            State::HalfOpen => "half-open",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<u8> for State {
    fn from(value: u8) -> Self {
        match value {
            0 => State::Closed,
            1 => State::Open,
            2 => State::HalfOpen,
            _ => State::Closed, // Default to closed for invalid values
        }
    }
}

/// Lock-free view of the breaker state.
///
/// Writes happen only while the breaker holds its state lock, so readers see
/// every transition in order.
#[derive(Debug)]
pub(crate) struct StateCell {
    state: AtomicU8,
    last_transition: parking_lot::Mutex<Instant>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicU8::new(State::Closed as u8),
            last_transition: parking_lot::Mutex::new(Instant::now()),
        }
    }

    pub(crate) fn current(&self) -> State {
        State::from(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, state: State, now: Instant) {
        *self.last_transition.lock() = now;
        self.state.store(state as u8, Ordering::Release);
    }

    pub(crate) fn time_in_state(&self) -> Duration {
        self.last_transition.lock().elapsed()
    }
}
