mod common;

use circuitpolicy_rs::{
    CircuitEngine, CircuitRequest, ConfigSettingsProvider, ContextSettingsProvider, Outcome,
    PolicySettings, PolicySettingsConfig, SettingsError, SettingsProvider, StaticSettingsProvider,
    DEFAULT_MAX_PARALLELIZATION, DEFAULT_RETRY, TAG_DO_NOT_CACHE, TAG_MAX_PARALLELIZATION,
    TAG_RETRY, TAG_TIMEOUT_MS,
};
use common::TestError;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

struct FailingProvider;

impl SettingsProvider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    fn resolve<'a>(
        &'a self,
        _request: &'a CircuitRequest,
    ) -> BoxFuture<'a, Result<Option<PolicySettings>, SettingsError>> {
        Box::pin(async {
            Err(SettingsError::with_source(
                "settings store unavailable",
                TestError::new("connection refused"),
            ))
        })
    }
}

/// Counts lookups and yields once so concurrent builders overlap.
#[derive(Default)]
struct CountingProvider {
    lookups: AtomicU32,
}

impl SettingsProvider for CountingProvider {
    fn resolve<'a>(
        &'a self,
        _request: &'a CircuitRequest,
    ) -> BoxFuture<'a, Result<Option<PolicySettings>, SettingsError>> {
        Box::pin(async move {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok(Some(PolicySettings {
                max_parallelization: Some(4),
                ..PolicySettings::default()
            }))
        })
    }
}

fn books_config() -> PolicySettingsConfig {
    serde_json::from_str(
        r#"{
            "policies": [
                { "circuit_key": "books-service", "retry": 2, "timeout_ms": 250 },
                { "circuit_key": "api-authors", "max_parallelization": 3, "max_queuing_actions": 0 },
                { "circuit_key": "api-authors", "max_parallelization": 40 }
            ]
        }"#,
    )
    .expect("valid config")
}

#[tokio::test(start_paused = true)]
async fn test_config_provider_matches_key_then_service() {
    let engine = CircuitEngine::builder()
        .provider(ConfigSettingsProvider::new(&books_config()))
        .build();

    // Direct key match; the first duplicate entry wins
    let authors = engine
        .cache()
        .get_pipeline(&CircuitRequest::new("api-authors"))
        .await;
    assert_eq!(authors.settings().max_parallelization, 3);
    assert_eq!(authors.bulkhead().max_queuing_actions(), 0);

    // Falls back to the service name
    let request = CircuitRequest::builder("api-books-get")
        .service_name("books-service")
        .build();
    let books = engine.cache().get_pipeline(&request).await;
    assert_eq!(books.settings().retry, 2);
    assert_eq!(books.timeout().timeout(), Duration::from_millis(250));

    // Unknown circuits run on defaults
    let unknown = engine
        .cache()
        .get_pipeline(&CircuitRequest::new("api-unknown"))
        .await;
    assert_eq!(unknown.settings().retry, DEFAULT_RETRY);
    assert_eq!(
        unknown.settings().max_parallelization,
        DEFAULT_MAX_PARALLELIZATION
    );
}

#[tokio::test(start_paused = true)]
async fn test_config_retry_applies_to_execution() {
    let engine = CircuitEngine::builder()
        .provider(ConfigSettingsProvider::new(&books_config()))
        .build();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);

    let request = CircuitRequest::builder("api-books-get")
        .service_name("books-service")
        .build();
    let response = assert_ok!(
        engine
            .execute(request, move |_attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(TestError::new("down")) }
            })
            .await
    );

    assert_eq!(response.status(), Outcome::Failed);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_context_tags_are_parsed() {
    let engine = CircuitEngine::builder()
        .provider(ContextSettingsProvider)
        .build();

    let request = CircuitRequest::builder("api-books")
        .tag(TAG_RETRY, "2")
        .tag(TAG_TIMEOUT_MS, "250")
        .tag(TAG_MAX_PARALLELIZATION, "lots")
        .build();
    let pipeline = engine.cache().get_pipeline(&request).await;

    assert_eq!(pipeline.settings().retry, 2);
    assert_eq!(pipeline.timeout().timeout(), Duration::from_millis(250));
    // Unparsable tags are ignored
    assert_eq!(
        pipeline.bulkhead().max_parallelization(),
        DEFAULT_MAX_PARALLELIZATION
    );
}

#[tokio::test(start_paused = true)]
async fn test_typed_overrides_beat_tags() {
    let engine = CircuitEngine::builder()
        .provider(ContextSettingsProvider)
        .build();

    let request = CircuitRequest::builder("api-books")
        .overrides(PolicySettings {
            retry: Some(1),
            ..PolicySettings::default()
        })
        .tag(TAG_RETRY, "4")
        .tag(TAG_MAX_PARALLELIZATION, "8")
        .build();
    let pipeline = engine.cache().get_pipeline(&request).await;

    assert_eq!(pipeline.settings().retry, 1);
    assert_eq!(pipeline.settings().max_parallelization, 8);
}

#[tokio::test(start_paused = true)]
async fn test_context_tag_disables_caching() {
    let engine = CircuitEngine::builder()
        .provider(ContextSettingsProvider)
        .build();

    let request = CircuitRequest::builder("api-books")
        .tag(TAG_DO_NOT_CACHE, "true")
        .build();
    let pipeline = engine.cache().get_pipeline(&request).await;

    assert!(pipeline.settings().do_not_cache);
    assert!(engine.cache().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_first_matching_provider_wins() {
    let engine = CircuitEngine::builder()
        .provider(ContextSettingsProvider)
        .provider(StaticSettingsProvider::new(PolicySettings {
            max_parallelization: Some(9),
            ..PolicySettings::default()
        }))
        .build();

    // No context data: the context provider passes
    let plain = engine
        .cache()
        .get_pipeline(&CircuitRequest::new("api-books"))
        .await;
    assert_eq!(plain.settings().max_parallelization, 9);

    // Context data present: the static provider is never reached
    let tagged = CircuitRequest::builder("api-authors")
        .tag(TAG_RETRY, "1")
        .build();
    let tagged = engine.cache().get_pipeline(&tagged).await;
    assert_eq!(tagged.settings().retry, 1);
    assert_eq!(
        tagged.settings().max_parallelization,
        DEFAULT_MAX_PARALLELIZATION
    );
}

#[tokio::test(start_paused = true)]
async fn test_failing_provider_is_skipped_and_not_cached() {
    let engine = CircuitEngine::builder()
        .provider(FailingProvider)
        .provider(StaticSettingsProvider::new(PolicySettings {
            max_parallelization: Some(7),
            ..PolicySettings::default()
        }))
        .build();

    let pipeline = engine
        .cache()
        .get_pipeline(&CircuitRequest::new("api-books"))
        .await;
    assert_eq!(pipeline.settings().max_parallelization, 7);
    assert!(pipeline.settings().do_not_cache);

    let response = assert_ok!(
        engine
            .execute(CircuitRequest::new("api-books"), |_attempt| async {
                Ok::<_, TestError>(())
            })
            .await
    );
    assert_eq!(response.status(), Outcome::Succeed);
    assert!(engine.cache().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_build_once() {
    let provider = Arc::new(CountingProvider::default());
    let engine = Arc::new(
        CircuitEngine::builder()
            .shared_provider(provider.clone())
            .build(),
    );

    let mut handles = Vec::new();
    for _ in 0..16 {
        let engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            engine
                .cache()
                .get_pipeline(&CircuitRequest::new("api-books"))
                .await
        }));
    }

    let mut pipelines = Vec::new();
    for handle in handles {
        pipelines.push(handle.await.expect("task panicked"));
    }

    assert_eq!(provider.lookups.load(Ordering::SeqCst), 1);
    assert_eq!(engine.cache().len(), 1);
    assert!(pipelines
        .windows(2)
        .all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
}
