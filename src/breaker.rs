//! Circuit breaker state machine.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::hook::HookRegistry;
use crate::settings::EffectiveSettings;
use crate::state::{State, StateCell};
use crate::window::{HealthInfo, RollingWindow};

/// Mutable breaker state, guarded by one lock so every transition is linear.
#[derive(Debug)]
struct Core {
    state: State,
    window: RollingWindow,
    open_until: Instant,
    trial_in_flight: bool,
    /// Bumped on every transition. Permits from an older generation are stale.
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PermitKind {
    Normal,
    Trial,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: State,
    to: State,
    generation: u64,
    health: Option<HealthInfo>,
}

/// Tracks the health of one circuit and decides whether calls may proceed.
///
/// Closed circuits sample every call into a rolling window and trip open once
/// the window holds at least `minimum_throughput` samples with a failure ratio
/// at or above the threshold. Open circuits reject until `break_duration`
/// elapses, after which the next caller becomes the single half-open trial.
#[derive(Debug)]
pub struct CircuitBreaker {
    circuit_key: Arc<str>,
    failure_ratio: f64,
    minimum_throughput: u32,
    break_duration: Duration,
    core: Mutex<Core>,
    state: StateCell,
    hooks: Arc<HookRegistry>,
}

/// Admission ticket returned by [`CircuitBreaker::enter`].
///
/// A permit belongs to the state period that admitted it; once the circuit
/// transitions, its result is ignored. Dropping an unrecorded trial permit
/// frees the half-open slot without counting a sample.
#[must_use]
pub(crate) struct BreakerPermit<'a> {
    breaker: &'a CircuitBreaker,
    kind: PermitKind,
    generation: u64,
    recorded: bool,
}

impl BreakerPermit<'_> {
    pub(crate) fn record(mut self, success: bool) {
        self.recorded = true;
        self.breaker.exit(self.kind, self.generation, success);
    }
}

impl Drop for BreakerPermit<'_> {
    fn drop(&mut self) {
        if !self.recorded && self.kind == PermitKind::Trial {
            self.breaker.abandon_trial(self.generation);
        }
    }
}

impl CircuitBreaker {
    pub(crate) fn new(
        circuit_key: Arc<str>,
        settings: &EffectiveSettings,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self {
            circuit_key,
            failure_ratio: settings.failure_ratio(),
            minimum_throughput: settings.minimum_throughput,
            break_duration: settings.break_duration,
            core: Mutex::new(Core {
                state: State::Closed,
                window: RollingWindow::new(settings.sampling_duration),
                open_until: Instant::now(),
                trial_in_flight: false,
                generation: 0,
            }),
            state: StateCell::new(),
            hooks,
        }
    }

    /// Key of the circuit this breaker protects.
    pub fn circuit_key(&self) -> &str {
        &self.circuit_key
    }

    /// Gets the current state of the circuit breaker.
    ///
    /// An open circuit whose break has elapsed still reports `Open` until the
    /// next call arrives and becomes the trial.
    pub fn state(&self) -> State {
        self.state.current()
    }

    /// Time spent in the current state.
    pub fn time_in_state(&self) -> Duration {
        self.state.time_in_state()
    }

    /// Samples currently in the rolling window.
    pub fn health(&self) -> HealthInfo {
        let now = Instant::now();
        self.core.lock().window.health(now)
    }

    /// Failure ratio of the rolling window.
    pub fn failure_rate(&self) -> f64 {
        self.health().failure_rate()
    }

    /// Asks for admission. `None` means the call is rejected as broken.
    pub(crate) fn enter(&self) -> Option<BreakerPermit<'_>> {
        let now = Instant::now();

        let (admitted, transition) = {
            let mut core = self.core.lock();
            match core.state {
                State::Closed => (Some((PermitKind::Normal, core.generation)), None),
                State::Open if now >= core.open_until => {
                    core.trial_in_flight = true;
                    let transition = self.transition(&mut core, State::HalfOpen, now, None);
                    (Some((PermitKind::Trial, core.generation)), Some(transition))
                }
                State::HalfOpen if !core.trial_in_flight => {
                    core.trial_in_flight = true;
                    (Some((PermitKind::Trial, core.generation)), None)
                }
                State::Open | State::HalfOpen => (None, None),
            }
        };

        let Some((kind, generation)) = admitted else {
            trace!(
                circuit_key = %self.circuit_key,
                state = %self.state(),
                "call rejected by circuit"
            );
            return None;
        };

        // The permit exists before hooks run, so an unwinding hook still frees the trial.
        let permit = BreakerPermit {
            breaker: self,
            kind,
            generation,
            recorded: false,
        };
        if let Some(transition) = transition {
            self.announce(transition);
        }
        Some(permit)
    }

    fn exit(&self, kind: PermitKind, generation: u64, success: bool) {
        let now = Instant::now();

        let transition = {
            let mut core = self.core.lock();
            if core.generation != generation {
                // Admitted in an earlier state period.
                trace!(
                    circuit_key = %self.circuit_key,
                    permit_generation = generation,
                    generation = core.generation,
                    "ignoring late result"
                );
                return;
            }
            match (core.state, kind) {
                (State::Closed, PermitKind::Normal) => {
                    core.window.record(success, now);
                    let health = core.window.health(now);
                    health
                        .should_trip(self.failure_ratio, self.minimum_throughput)
                        .then(|| self.transition(&mut core, State::Open, now, Some(health)))
                }
                (State::HalfOpen, PermitKind::Trial) => {
                    core.trial_in_flight = false;
                    let to = if success { State::Closed } else { State::Open };
                    Some(self.transition(&mut core, to, now, None))
                }
                // A current permit always matches the state that admitted it.
                _ => None,
            }
        };

        if let Some(transition) = transition {
            self.announce(transition);
        }
    }

    fn abandon_trial(&self, generation: u64) {
        let mut core = self.core.lock();
        if core.generation == generation && core.state == State::HalfOpen && core.trial_in_flight {
            core.trial_in_flight = false;
            debug!(circuit_key = %self.circuit_key, generation, "trial call abandoned");
        }
    }

    fn transition(
        &self,
        core: &mut Core,
        to: State,
        now: Instant,
        health: Option<HealthInfo>,
    ) -> Transition {
        let from = core.state;
        core.state = to;
        core.generation = core.generation.wrapping_add(1);
        match to {
            State::Open => core.open_until = now + self.break_duration,
            State::Closed => core.window.reset(),
            State::HalfOpen => {}
        }
        self.state.store(to, now);
        Transition {
            from,
            to,
            generation: core.generation,
            health,
        }
    }

    fn announce(&self, transition: Transition) {
        match transition.health {
            Some(health) => info!(
                circuit_key = %self.circuit_key,
                from = %transition.from,
                to = %transition.to,
                generation = transition.generation,
                throughput = health.throughput,
                failure_rate = health.failure_rate(),
                break_duration_ms = self.break_duration.as_millis() as u64,
                "circuit state changed"
            ),
            None => info!(
                circuit_key = %self.circuit_key,
                from = %transition.from,
                to = %transition.to,
                generation = transition.generation,
                "circuit state changed"
            ),
        }
        self.hooks
            .execute_state_transition_hook(&self.circuit_key, transition.to);
    }

    /// Forces the circuit open for one break duration.
    ///
    /// Returns false if it was already open.
    pub fn force_open(&self) -> bool {
        let now = Instant::now();
        let transition = {
            let mut core = self.core.lock();
            if core.state == State::Open {
                return false;
            }
            core.trial_in_flight = false;
            self.transition(&mut core, State::Open, now, None)
        };
        self.announce(transition);
        true
    }

    /// Forces the circuit closed and clears its samples.
    ///
    /// Returns false if it was already closed.
    pub fn force_closed(&self) -> bool {
        let now = Instant::now();
        let transition = {
            let mut core = self.core.lock();
            if core.state == State::Closed {
                return false;
            }
            core.trial_in_flight = false;
            self.transition(&mut core, State::Closed, now, None)
        };
        self.announce(transition);
        true
    }
}
