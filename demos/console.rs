use circuitpolicy_rs::prelude::*;
use circuitpolicy_rs::{PolicySettingsConfig, TracingListener, TAG_TIMEOUT_MS};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// Custom error type that implements Error trait
#[derive(Debug)]
struct ServiceError(String);

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service error: {}", self.0)
    }
}

impl std::error::Error for ServiceError {}

const POLICIES: &str = r#"{
    "policies": [
        {
            "circuit_key": "books-service",
            "retry": 1,
            "timeout_ms": 200,
            "failure_percent_threshold": 50,
            "minimum_throughput": 4,
            "sampling_duration_ms": 2000,
            "break_duration_ms": 1000
        }
    ]
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config: PolicySettingsConfig = serde_json::from_str(POLICIES)?;
    let engine = CircuitEngine::builder()
        .provider(ContextSettingsProvider)
        .provider(ConfigSettingsProvider::new(&config))
        .listener(TracingListener)
        .app_name("console")
        .build();

    let calls = Arc::new(AtomicU32::new(0));

    for i in 1..=20 {
        let request = CircuitRequest::builder("api-books-get")
            .request_id(format!("req-{i}"))
            .service_name("books-service")
            .build();

        let calls = Arc::clone(&calls);
        let response = engine
            .execute(request, move |attempt: Attempt| {
                let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    // Calls 4 through 12 hit an outage
                    if (4..=12).contains(&call) {
                        return Err(ServiceError(format!("outage on attempt {}", attempt.number())));
                    }
                    Ok(format!("books page {call}"))
                }
            })
            .await?;

        match response.status() {
            Outcome::Succeed => println!("{i:>2}: {}", response.value().map_or("", String::as_str)),
            Outcome::Broken => {
                println!("{i:>2}: circuit open, backing off");
                tokio::time::sleep(Duration::from_millis(400)).await;
            }
            status => println!("{i:>2}: {status} after {:?}", response.execution_time()),
        }

        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    // Per-call override through a context tag
    let request = CircuitRequest::builder("api-search")
        .tag(TAG_TIMEOUT_MS, "50")
        .build();
    let response = engine
        .execute(request, |_attempt| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, ServiceError>(())
        })
        .await?;
    println!("slow search: {}", response.status());

    Ok(())
}
