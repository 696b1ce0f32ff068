use criterion::{criterion_group, criterion_main, Criterion};
use rand::Rng;
use std::sync::Arc;
use std::thread;

// Import the cache and its collaborators from the crate
use kresource::buffer::BlockCache;
use kresource::clock::Ticks;
use kresource::config::CacheConfig;
use kresource::disk::MemDisk;

// Test configuration
const THREAD_COUNT: usize = 8;
const OPERATIONS_PER_THREAD: usize = 2_000;

fn new_cache(nbuf: usize) -> (Arc<BlockCache>, Arc<Ticks>) {
    let ticks = Arc::new(Ticks::new());
    let cache = BlockCache::new(
        CacheConfig { nbuf, nbuckets: 13 },
        Arc::new(MemDisk::new()),
        ticks.clone(),
    )
    .unwrap();
    (Arc::new(cache), ticks)
}

// Runs THREAD_COUNT workers reading random blocks in `0..working_set`
fn run_readers(cache: &Arc<BlockCache>, ticks: &Arc<Ticks>, working_set: u32) {
    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|_| {
            let cache = cache.clone();
            let ticks = ticks.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..OPERATIONS_PER_THREAD {
                    ticks.tick();
                    let blockno = rng.gen_range(0..working_set);
                    let buf = cache.bread(1, blockno).unwrap();
                    criterion::black_box(buf.data()[0]);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

// Every block stays resident; only bucket and slot locks are exercised
pub fn bench_hot_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockCache");

    group.bench_function("HotSet", |b| {
        let (cache, ticks) = new_cache(30);
        b.iter(|| run_readers(&cache, &ticks, 20));
    });

    group.finish();
}

// The working set is larger than the pool, so most acquires evict under the arbiter
pub fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("BlockCache");

    group.bench_function("Churn", |b| {
        let (cache, ticks) = new_cache(30);
        b.iter(|| run_readers(&cache, &ticks, 300));
    });

    group.finish();
}

criterion_group!(benches, bench_hot_set, bench_churn);
criterion_main!(benches);
