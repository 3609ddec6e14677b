use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use chrono::TimeDelta;
use criterion::BenchmarkId;
use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;

use turnstile_limit::CounterStore;
use turnstile_limit::FixedWindow;
use turnstile_limit::KeyedFixedWindow;
use turnstile_limit::KeyedStrategy;
use turnstile_limit::Strategy;

fn bench_single_window(c: &mut Criterion, strategy: Arc<FixedWindow>) {
    let mut group = c.benchmark_group("FixedWindow");

    group.bench_function("single-threaded", |b| {
        b.iter(|| {
            let _ = black_box(strategy.as_ref()).process();
        })
    });

    group.finish();
}

fn bench_keyed<S: KeyedStrategy + Send + Sync + 'static>(
    group_name: &str,
    c: &mut Criterion,
    strategy: Arc<S>,
    keys: usize,
) {
    let mut group = c.benchmark_group(group_name);
    let names: Vec<String> = (0..keys).map(|i| format!("10.0.{}.{}", i / 256, i % 256)).collect();

    group.bench_function("single-threaded", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % names.len();
            let _ = black_box(strategy.as_ref()).process(&names[i]);
        })
    });

    for threads in [2, 4, 8].iter() {
        let num_threads = *threads;
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}-threads", num_threads)),
            &num_threads,
            |b, &n| {
                b.iter_custom(|iters| {
                    let barrier = Arc::new(Barrier::new(n + 1));
                    let mut handles = Vec::with_capacity(n);

                    for t in 0..n {
                        let s = Arc::clone(&strategy);
                        let bar = Arc::clone(&barrier);
                        let names = names.clone();
                        let iters_per_thread = iters / n as u64;

                        handles.push(thread::spawn(move || {
                            bar.wait(); // Wait for the start signal
                            for i in 0..iters_per_thread as usize {
                                let key = &names[(i + t) % names.len()];
                                let _ = black_box(s.process(key));
                            }
                        }));
                    }

                    // Synchronize the start across all threads
                    barrier.wait();
                    let start = Instant::now();

                    for handle in handles {
                        let _ = handle.join();
                    }

                    start.elapsed()
                });
            },
        );
    }
    group.finish();
}

fn bench_counter_store(c: &mut Criterion) {
    let mut group = c.benchmark_group("CounterStore");
    let store = CounterStore::new();
    let ttl = TimeDelta::hours(24);

    group.bench_function("increment-hot-key", |b| {
        b.iter(|| black_box(store.increment("key:2024-01-01", ttl)))
    });

    let names: Vec<String> = (0..1024).map(|i| format!("key-{}:2024-01-01", i)).collect();
    group.bench_function("increment-spread-keys", |b| {
        let mut i = 0;
        b.iter(|| {
            i = (i + 1) % names.len();
            black_box(store.increment(&names[i], ttl))
        })
    });

    group.finish();
}

fn run_all_benches(c: &mut Criterion) {
    let limit = NonZeroUsize::new(1_000_000).unwrap();
    let period = Duration::from_secs(60);

    bench_single_window(c, Arc::new(FixedWindow::new(limit, period)));

    bench_keyed(
        "KeyedFixedWindow-1-key",
        c,
        Arc::new(KeyedFixedWindow::new(limit, period)),
        1,
    );
    bench_keyed(
        "KeyedFixedWindow-1024-keys",
        c,
        Arc::new(KeyedFixedWindow::new(limit, period)),
        1024,
    );

    bench_counter_store(c);
}

criterion_group!(benches, run_all_benches);
criterion_main!(benches);
