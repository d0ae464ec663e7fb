//! Prometheus status listener.

use futures::future::BoxFuture;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{exponential_buckets, Histogram};
use prometheus_client::registry::Registry;

use crate::error::ListenerError;
use crate::listener::{StatusListener, StatusSnapshot};
use crate::outcome::Outcome;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct OutcomeLabels {
    app: String,
    service: String,
    status: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ServiceLabels {
    app: String,
    service: String,
}

/// Counts outcomes per app, service and status, and records the execution
/// time of successful calls.
#[derive(Debug, Clone)]
pub struct PrometheusListener {
    outcomes: Family<OutcomeLabels, Counter>,
    execution_time: Family<ServiceLabels, Histogram>,
}

impl Default for PrometheusListener {
    fn default() -> Self {
        Self::new()
    }
}

impl PrometheusListener {
    /// Creates the metric families. Call [`register`](Self::register) to expose them.
    pub fn new() -> Self {
        Self {
            outcomes: Family::default(),
            execution_time: Family::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 16))
            }),
        }
    }

    /// Registers `circuit_outcomes` and `circuit_execution_seconds` in `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "circuit_outcomes",
            "Circuit executions by final status",
            self.outcomes.clone(),
        );
        registry.register(
            "circuit_execution_seconds",
            "Execution time of successful circuit calls",
            self.execution_time.clone(),
        );
    }

    fn record(&self, snapshot: &StatusSnapshot) {
        let app = snapshot.app_name().unwrap_or("unknown").to_owned();
        let service = snapshot.service_name().to_owned();

        self.outcomes
            .get_or_create(&OutcomeLabels {
                app: app.clone(),
                service: service.clone(),
                status: snapshot.status().as_str().to_owned(),
            })
            .inc();

        if snapshot.status() == Outcome::Succeed {
            self.execution_time
                .get_or_create(&ServiceLabels { app, service })
                .observe(snapshot.execution_time().as_secs_f64());
        }
    }
}

impl StatusListener for PrometheusListener {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn notify<'a>(&'a self, snapshot: &'a StatusSnapshot) -> BoxFuture<'a, Result<(), ListenerError>> {
        self.record(snapshot);
        Box::pin(futures::future::ready(Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CircuitRequest;
    use prometheus_client::encoding::text::encode;
    use std::time::Duration;

    #[tokio::test]
    async fn records_outcomes_and_success_latency() {
        let listener = PrometheusListener::new();
        let mut registry = Registry::default();
        listener.register(&mut registry);

        let mut request = CircuitRequest::builder("api-books")
            .app_name("bookworm")
            .build();
        request.fill_defaults(None);

        for (status, millis) in [
            (Outcome::Succeed, 12),
            (Outcome::Failed, 3),
            (Outcome::Failed, 4),
        ] {
            let snapshot = StatusSnapshot::new(&request, status, Duration::from_millis(millis));
            listener.notify(&snapshot).await.unwrap();
        }

        let mut output = String::new();
        encode(&mut output, &registry).unwrap();

        assert!(output.contains(
            r#"circuit_outcomes_total{app="bookworm",service="api-books",status="Succeed"} 1"#
        ));
        assert!(output.contains(
            r#"circuit_outcomes_total{app="bookworm",service="api-books",status="Failed"} 2"#
        ));
        // Only successful calls feed the latency histogram
        assert!(output
            .contains(r#"circuit_execution_seconds_count{app="bookworm",service="api-books"} 1"#));
    }
}
