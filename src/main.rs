//! kresource main program entry
//!
//! Boots both resource pools from an optional JSON configuration file, runs one worker
//! per CPU against them and prints a usage report.

// Use jemalloc as global allocator
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

use kresource::clock::Ticks;
use kresource::console::Console;
use kresource::cpu::CpuGuard;
use kresource::disk::{DiskResult, MemDisk};
use kresource::{AllocError, BlockCache, Kalloc, KernelConfig};
use log::LevelFilter;
use rand::Rng;
use std::error::Error;
use std::sync::Arc;
use std::thread;

const OPERATIONS_PER_CPU: usize = 10_000;
const BLOCKS: u32 = 200;

/// Per-worker tallies
#[derive(Default)]
struct WorkerReport {
    blocks: usize,
    pages: usize,
    out_of_memory: usize,
}

fn run_worker(
    cpu: usize,
    cache: Arc<BlockCache>,
    kalloc: Arc<Kalloc>,
    ticks: Arc<Ticks>,
) -> DiskResult<WorkerReport> {
    let _cpu = CpuGuard::bind(cpu);
    let mut rng = rand::thread_rng();
    let mut report = WorkerReport::default();
    let mut held = Vec::new();

    for _ in 0..OPERATIONS_PER_CPU {
        ticks.tick();

        let mut buf = cache.bread(1, rng.gen_range(0..BLOCKS))?;
        let data = buf.data_mut();
        data[0] = data[0].wrapping_add(1);
        buf.write()?;
        drop(buf);
        report.blocks += 1;

        if rng.gen_bool(0.5) {
            match kalloc.alloc() {
                Ok(page) => {
                    held.push(page);
                    report.pages += 1;
                }
                Err(AllocError::OutOfMemory) => report.out_of_memory += 1,
            }
        } else if let Some(page) = held.pop() {
            kalloc.free(page);
        }
    }

    for page in held {
        kalloc.free(page);
    }
    Ok(report)
}

fn run() -> Result<(), Box<dyn Error>> {
    let level = if cfg!(debug_assertions) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Console::init(level)?;

    let config = match std::env::args().nth(1) {
        Some(path) => {
            log::info!("loading configuration from {}", path);
            KernelConfig::load(path)?
        }
        None => KernelConfig::default(),
    };

    let ticks = Arc::new(Ticks::new());
    let disk = Arc::new(MemDisk::new());
    let cache = Arc::new(BlockCache::new(config.cache, disk.clone(), ticks.clone())?);
    let kalloc = Arc::new(Kalloc::new(config.kalloc)?);

    // Each worker holds at most one buffer at a time
    let workers = kalloc.ncpu().min(cache.capacity());
    let free_at_boot = kalloc.free_pages();

    let handles: Vec<_> = (0..workers)
        .map(|cpu| {
            let cache = cache.clone();
            let kalloc = kalloc.clone();
            let ticks = ticks.clone();
            thread::spawn(move || run_worker(cpu, cache, kalloc, ticks))
        })
        .collect();

    let mut total = WorkerReport::default();
    for handle in handles {
        let report = handle.join().map_err(|_| "worker panicked")??;
        total.blocks += report.blocks;
        total.pages += report.pages;
        total.out_of_memory += report.out_of_memory;
    }

    let stats = cache.stats();
    println!("kresource report");
    println!("================");
    println!("uptime:            {} ticks", ticks.uptime());
    println!("workers:           {}", workers);
    println!(
        "block cache:       {} buffers, {} buckets",
        cache.capacity(),
        cache.nbuckets()
    );
    println!("    operations:    {}", total.blocks);
    println!(
        "    hits/misses:   {}/{} ({} evictions)",
        stats.hits, stats.misses, stats.evictions
    );
    println!(
        "    disk:          {} reads, {} writes",
        disk.reads(),
        disk.writes()
    );
    println!(
        "page allocator:    {} pages on {} cpus",
        kalloc.total_pages(),
        kalloc.ncpu()
    );
    println!(
        "    allocations:   {} ({} out of memory)",
        total.pages, total.out_of_memory
    );
    println!(
        "    free pages:    {} at boot, {} now",
        free_at_boot,
        kalloc.free_pages()
    );
    Ok(())
}

fn main() {
    if let Err(err) = run() {
        log::error!("kresource: {}", err);
        eprintln!("kresource: {}", err);
        std::process::exit(1);
    }
}
