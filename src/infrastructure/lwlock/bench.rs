use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;

// Reference the main crate
extern crate kresource;

// Import the lock classes from the main crate
use kresource::infrastructure::lwlock::{SleepLock, SpinLock};

// Test configuration
const THREADS: usize = 8;
const OPERATIONS_PER_THREAD: usize = 10_000;

// Generic lock benchmark function
fn bench_lock_scenario<T: Send + Sync + 'static>(
    b: &mut criterion::Bencher,
    threads: usize,
    create_lock: fn(usize) -> Arc<T>,
    critical_section: fn(&T, usize),
) {
    b.iter(|| {
        let lock = create_lock(0);

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let lock = lock.clone();
                thread::spawn(move || {
                    for i in 0..OPERATIONS_PER_THREAD {
                        critical_section(&lock, i);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    });
}

// Benchmark short critical sections under contention
pub fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("Contended");

    group.bench_function("SpinLock", |b| {
        bench_lock_scenario(
            b,
            THREADS,
            |value| Arc::new(SpinLock::named("bench", value)),
            |lock: &SpinLock<usize>, value| *lock.lock() += value,
        )
    });

    group.bench_function("SleepLock", |b| {
        bench_lock_scenario(
            b,
            THREADS,
            |value| Arc::new(SleepLock::named("bench", value)),
            |lock: &SleepLock<usize>, value| *lock.lock() += value,
        )
    });

    group.finish();
}

// Benchmark the same critical sections with a single thread
pub fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("Uncontended");

    group.bench_function("SpinLock", |b| {
        bench_lock_scenario(
            b,
            1,
            |value| Arc::new(SpinLock::named("bench", value)),
            |lock: &SpinLock<usize>, value| *lock.lock() += value,
        )
    });

    group.bench_function("SleepLock", |b| {
        bench_lock_scenario(
            b,
            1,
            |value| Arc::new(SleepLock::named("bench", value)),
            |lock: &SleepLock<usize>, value| *lock.lock() += value,
        )
    });

    group.finish();
}

// Export the benchmark group for criterion
criterion_group!(benches, bench_contended, bench_uncontended);

// Only run the benchmark group when this file is executed directly
criterion_main!(benches);
