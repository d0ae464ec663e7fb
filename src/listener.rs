//! Status listeners and best-effort telemetry fan-out.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{error, info, warn};

use crate::error::ListenerError;
use crate::outcome::Outcome;
use crate::request::{CircuitContext, CircuitRequest};

/// What listeners learn about one execution.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    status: Outcome,
    execution_time: Duration,
    request_id: Option<String>,
    app_name: Option<String>,
    service_name: String,
    circuit_key: String,
    context: CircuitContext,
}

impl StatusSnapshot {
    pub(crate) fn new(request: &CircuitRequest, status: Outcome, execution_time: Duration) -> Self {
        Self {
            status,
            execution_time,
            request_id: request.request_id().map(str::to_owned),
            app_name: request.app_name().map(str::to_owned),
            service_name: request.service_name().to_owned(),
            circuit_key: request.circuit_key().to_owned(),
            context: request.context().clone(),
        }
    }

    /// Final status.
    pub fn status(&self) -> Outcome {
        self.status
    }

    /// Duration of the last attempt.
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    /// Correlation id of the request.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Calling application.
    pub fn app_name(&self) -> Option<&str> {
        self.app_name.as_deref()
    }

    /// Protected service.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Circuit key of the request.
    pub fn circuit_key(&self) -> &str {
        &self.circuit_key
    }

    /// Context the request carried.
    pub fn context(&self) -> &CircuitContext {
        &self.context
    }
}

/// Receives one notification per execution.
///
/// Failures and panics are logged and otherwise ignored; they never reach the
/// caller of `execute` or other listeners.
pub trait StatusListener: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Handles one snapshot.
    fn notify<'a>(&'a self, snapshot: &'a StatusSnapshot) -> BoxFuture<'a, Result<(), ListenerError>>;
}

/// Logs every snapshot as a structured `tracing` event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl StatusListener for TracingListener {
    fn name(&self) -> &str {
        "tracing"
    }

    fn notify<'a>(&'a self, snapshot: &'a StatusSnapshot) -> BoxFuture<'a, Result<(), ListenerError>> {
        info!(
            request_id = snapshot.request_id().unwrap_or_default(),
            app_name = snapshot.app_name().unwrap_or_default(),
            service_name = %snapshot.service_name(),
            circuit_key = %snapshot.circuit_key(),
            status = %snapshot.status(),
            execution_time_ms = snapshot.execution_time().as_secs_f64() * 1000.0,
            "circuit status"
        );
        Box::pin(futures::future::ready(Ok(())))
    }
}

/// Delivers snapshots to every registered listener.
#[derive(Clone)]
pub(crate) struct Telemetry {
    listeners: Arc<[Arc<dyn StatusListener>]>,
    detached: bool,
}

impl Telemetry {
    pub(crate) fn new(listeners: Vec<Arc<dyn StatusListener>>, detached: bool) -> Self {
        Self {
            listeners: listeners.into(),
            detached,
        }
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    pub(crate) fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Notifies all listeners concurrently.
    ///
    /// Detached delivery is spawned on the current tokio runtime and falls back
    /// to inline delivery outside one.
    pub(crate) async fn publish(&self, snapshot: StatusSnapshot) {
        if !self.has_listeners() {
            return;
        }

        let snapshot = Arc::new(snapshot);
        if self.detached {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                let listeners = Arc::clone(&self.listeners);
                handle.spawn(async move {
                    fan_out(&listeners, &snapshot).await;
                });
                return;
            }
        }

        fan_out(&self.listeners, &snapshot).await;
    }
}

async fn fan_out(listeners: &[Arc<dyn StatusListener>], snapshot: &StatusSnapshot) {
    let deliveries = listeners.iter().map(|listener| async move {
        let delivery = AssertUnwindSafe(async { listener.notify(snapshot).await }).catch_unwind();
        match delivery.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(
                listener = listener.name(),
                circuit_key = %snapshot.circuit_key(),
                error = %err,
                "status listener failed"
            ),
            Err(_panic) => error!(
                listener = listener.name(),
                circuit_key = %snapshot.circuit_key(),
                "status listener panicked"
            ),
        }
    });

    join_all(deliveries).await;
}
