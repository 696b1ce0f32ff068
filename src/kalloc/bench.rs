use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;

// Import the allocator from the crate
use kresource::config::KallocConfig;
use kresource::cpu::CpuGuard;
use kresource::kalloc::Kalloc;
use kresource::types::{KERNBASE, PAGE_SIZE};

// Test configuration
const THREAD_COUNT: usize = 4;
const OPERATIONS_PER_THREAD: usize = 5_000;

fn new_kalloc(pages: usize) -> Arc<Kalloc> {
    let config = KallocConfig {
        kernel_end: KERNBASE,
        phys_top: KERNBASE + pages * PAGE_SIZE,
        ncpu: THREAD_COUNT,
    };
    Arc::new(Kalloc::new(config).unwrap())
}

// Each worker allocates `batch` pages on its own CPU and frees them again
fn run_workers(kalloc: &Arc<Kalloc>, batch: usize) {
    let handles: Vec<_> = (0..THREAD_COUNT)
        .map(|cpu| {
            let kalloc = kalloc.clone();
            thread::spawn(move || {
                let _cpu = CpuGuard::bind(cpu);
                let mut held = Vec::with_capacity(batch);
                for _ in 0..OPERATIONS_PER_THREAD / batch {
                    for _ in 0..batch {
                        if let Ok(page) = kalloc.alloc() {
                            held.push(page);
                        }
                    }
                    for page in held.drain(..) {
                        kalloc.free(page);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

// Every CPU is served from its own list
pub fn bench_local(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kalloc");

    group.bench_function("Local", |b| {
        let kalloc = new_kalloc(THREAD_COUNT * 64);
        b.iter(|| run_workers(&kalloc, 16));
    });

    group.finish();
}

// Batches exceed a partition, so workers steal from each other
pub fn bench_steal(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kalloc");

    group.bench_function("Steal", |b| {
        let kalloc = new_kalloc(THREAD_COUNT * 64);
        b.iter(|| run_workers(&kalloc, 100));
    });

    group.finish();
}

criterion_group!(benches, bench_local, bench_steal);
criterion_main!(benches);
