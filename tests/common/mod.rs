#![allow(dead_code)]

use circuitpolicy_rs::{
    CircuitEngine, CircuitRequest, Fingerprint, Outcome, PolicySettings, State,
    StaticSettingsProvider,
};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

// Custom error type that implements Error trait
#[derive(Debug)]
pub struct TestError(String);

impl TestError {
    pub fn new(msg: &str) -> Self {
        TestError(msg.to_string())
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test error: {}", self.0)
    }
}

impl std::error::Error for TestError {}

pub const BREAK: Duration = Duration::from_millis(500);

/// Trips after five samples at 50% failures; the window is long enough that
/// nothing ages out during a test.
pub fn breaker_settings() -> PolicySettings {
    PolicySettings {
        failure_percent_threshold: Some(50),
        minimum_throughput: Some(5),
        sampling_duration: Some(Duration::from_secs(30)),
        break_duration: Some(BREAK),
        ..PolicySettings::default()
    }
}

pub fn engine_with(settings: PolicySettings) -> CircuitEngine {
    CircuitEngine::builder()
        .provider(StaticSettingsProvider::new(settings))
        .app_name("bookworm")
        .build()
}

/// Runs one call that succeeds or fails, counting every attempt.
pub async fn call(engine: &CircuitEngine, key: &str, fail: bool, attempts: &Arc<AtomicU32>) -> Outcome {
    let counter = Arc::clone(attempts);
    let response = engine
        .execute(CircuitRequest::new(key), move |_attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if fail {
                    Err(TestError::new("downstream failure"))
                } else {
                    Ok("ok")
                }
            }
        })
        .await
        .expect("valid circuit key");
    response.status()
}

/// Trips `key` with three failures out of five calls.
pub async fn trip(engine: &CircuitEngine, key: &str, attempts: &Arc<AtomicU32>) {
    for fail in [true, false, true, false, true] {
        call(engine, key, fail, attempts).await;
    }
}

pub fn breaker_state(engine: &CircuitEngine, key: &str) -> State {
    engine
        .cache()
        .cached(&Fingerprint::of(&CircuitRequest::new(key)))
        .expect("pipeline cached")
        .breaker()
        .state()
}
