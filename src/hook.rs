//! Hook registry for circuit state transitions.

use crate::state::State;
use parking_lot::RwLock;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

type HookFn = Arc<dyn Fn(&str) + Send + Sync + 'static>;

/// Callbacks invoked when any circuit of an engine changes state.
///
/// Each hook receives the circuit key. Hooks run synchronously on the task that
/// caused the transition, after the breaker released its state lock. Two
/// transitions racing on different tasks may therefore reach their hooks out
/// of order; the `generation` field of the "circuit state changed" log line
/// gives the true order. A panicking hook is logged and swallowed.
pub struct HookRegistry {
    on_open: RwLock<Option<HookFn>>,
    on_close: RwLock<Option<HookFn>>,
    on_half_open: RwLock<Option<HookFn>>,
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("on_open", &self.on_open.read().is_some())
            .field("on_close", &self.on_close.read().is_some())
            .field("on_half_open", &self.on_half_open.read().is_some())
            .finish()
    }
}

impl HookRegistry {
    /// Creates a new empty hook registry.
    pub fn new() -> Self {
        Self {
            on_open: RwLock::new(None),
            on_close: RwLock::new(None),
            on_half_open: RwLock::new(None),
        }
    }

    /// Sets the hook to call when a circuit opens.
    pub fn set_on_open<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_open.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a circuit closes.
    pub fn set_on_close<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_close.write() = Some(Arc::new(f));
    }

    /// Sets the hook to call when a circuit half-opens.
    pub fn set_on_half_open<F>(&self, f: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        *self.on_half_open.write() = Some(Arc::new(f));
    }

    /// Executes the appropriate hook for a state transition.
    pub(crate) fn execute_state_transition_hook(&self, circuit_key: &str, to: State) {
        let slot = match to {
            State::Open => &self.on_open,
            State::Closed => &self.on_close,
            State::HalfOpen => &self.on_half_open,
        };
        // Clone out so the hook never runs under the registry lock.
        let hook = slot.read().clone();
        let Some(hook) = hook else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| hook(circuit_key))).is_err() {
            error!(
                circuit_key,
                state = %to,
                "state transition hook panicked"
            );
        }
    }
}
