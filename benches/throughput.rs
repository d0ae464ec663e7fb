use circuitpolicy_rs::{CircuitEngine, CircuitRequest, PolicySettings, StaticSettingsProvider};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

// Custom error type that implements Error trait
#[derive(Debug)]
struct BenchError(String);

impl BenchError {
    fn new(msg: &str) -> Self {
        BenchError(msg.to_string())
    }
}

impl fmt::Display for BenchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Benchmark error: {}", self.0)
    }
}

impl std::error::Error for BenchError {}

fn engine() -> CircuitEngine {
    CircuitEngine::builder()
        .provider(StaticSettingsProvider::new(PolicySettings {
            max_parallelization: Some(1024),
            break_duration: Some(Duration::from_secs(3600)),
            ..PolicySettings::default()
        }))
        .app_name("bench")
        .build()
}

fn current_thread() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
}

fn bench_closed_success(c: &mut Criterion) {
    let rt = current_thread();
    let engine = engine();

    c.bench_function("execute_closed_success", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    engine
                        .execute(CircuitRequest::new("bench"), |_attempt| async {
                            Ok::<_, BenchError>(1_u64)
                        })
                        .await,
                )
            })
        });
    });
}

fn bench_open_rejection(c: &mut Criterion) {
    let rt = current_thread();
    let engine = engine();
    let pipeline = rt.block_on(engine.cache().get_pipeline(&CircuitRequest::new("bench")));
    pipeline.breaker().force_open();

    c.bench_function("execute_open_rejection", |b| {
        b.iter(|| {
            rt.block_on(async {
                black_box(
                    engine
                        .execute(CircuitRequest::new("bench"), |_attempt| async {
                            Err::<u64, _>(BenchError::new("never runs"))
                        })
                        .await,
                )
            })
        });
    });
}

fn bench_pipeline_lookup(c: &mut Criterion) {
    let rt = current_thread();
    let engine = engine();
    let request = CircuitRequest::builder("bench").retry(1).build();
    rt.block_on(engine.cache().get_pipeline(&request));

    c.bench_function("cached_pipeline_lookup", |b| {
        b.iter(|| rt.block_on(async { black_box(engine.cache().get_pipeline(&request).await) }));
    });
}

fn bench_concurrent(c: &mut Criterion) {
    const TASK_COUNT: usize = 4;
    const ITERATIONS_PER_TASK: usize = 1000;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(TASK_COUNT)
        .enable_time()
        .build()
        .expect("runtime");
    let engine = Arc::new(engine());

    c.bench_function("execute_concurrent", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut handles = Vec::with_capacity(TASK_COUNT);
                for _ in 0..TASK_COUNT {
                    let engine = Arc::clone(&engine);
                    handles.push(tokio::spawn(async move {
                        for _ in 0..ITERATIONS_PER_TASK {
                            let _ = black_box(
                                engine
                                    .execute(CircuitRequest::new("bench"), |_attempt| async {
                                        Ok::<_, BenchError>(())
                                    })
                                    .await,
                            );
                        }
                    }));
                }

                // Wait for all tasks to complete
                for handle in handles {
                    handle.await.unwrap();
                }
            })
        });
    });
}

criterion_group!(
    benches,
    bench_closed_success,
    bench_open_rejection,
    bench_pipeline_lookup,
    bench_concurrent
);
criterion_main!(benches);
