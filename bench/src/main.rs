//! kresource Benchmark Tool

use clap::Parser;
use kresource::clock::Ticks;
use kresource::config::{CacheConfig, KallocConfig};
use kresource::cpu::CpuGuard;
use kresource::disk::MemDisk;
use kresource::types::{KERNBASE, PAGE_SIZE};
use kresource::{BlockCache, Kalloc};
use rand::SeedableRng;
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

mod metrics;
mod scenarios;

use metrics::Metrics;
use scenarios::{Env, Scenario};

#[derive(Parser, Debug, Clone)]
#[command(name = "kresource-bench")]
#[command(about = "Block cache and page allocator benchmark tool")]
struct Args {
    #[arg(short = 't', long, default_value = "1")]
    threads: usize,

    #[arg(short = 'd', long, default_value = "10")]
    duration: u64,

    #[arg(short = 's', long, default_value = "cache_hot")]
    scenario: String,

    #[arg(long, default_value = "30")]
    nbuf: usize,

    #[arg(long, default_value = "13")]
    nbuckets: usize,

    /// Working set of the cache_churn scenario
    #[arg(long, default_value = "300")]
    blocks: u32,

    #[arg(long, default_value = "8")]
    ncpu: usize,

    #[arg(long, default_value = "4096")]
    pages: usize,

    #[arg(short = 'w', long, default_value = "0")]
    warmup: u64,

    #[arg(long, default_value = "0")]
    seed: u64,
}

fn run_thread(
    thread_id: usize,
    scenario: Arc<dyn Scenario>,
    env: Arc<Env>,
    stop_flag: Arc<AtomicBool>,
    metrics: Arc<Metrics>,
    args: Args,
) {
    let _cpu = CpuGuard::bind(thread_id % args.ncpu);
    let seed = args
        .seed
        .wrapping_add(thread_id as u64 * 0x9e3779b97f4a7c15);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    while !stop_flag.load(Ordering::Relaxed) {
        let start = Instant::now();
        match scenario.execute(&env, &mut rng) {
            Ok(()) => metrics.record_op(start.elapsed().as_nanos() as u64),
            Err(_) => metrics.record_error(),
        }
    }
}

fn build_env(args: &Args) -> Result<Env, Box<dyn Error>> {
    let ticks = Arc::new(Ticks::new());
    let cache = BlockCache::new(
        CacheConfig {
            nbuf: args.nbuf,
            nbuckets: args.nbuckets,
        },
        Arc::new(MemDisk::new()),
        ticks.clone(),
    )?;
    let kalloc = Kalloc::new(KallocConfig {
        kernel_end: KERNBASE,
        phys_top: KERNBASE + args.pages * PAGE_SIZE,
        ncpu: args.ncpu,
    })?;

    Ok(Env {
        cache: Arc::new(cache),
        kalloc: Arc::new(kalloc),
        ticks,
    })
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    println!("kresource Benchmark Tool");
    println!("========================");
    println!("Scenario: {}", args.scenario);
    println!("Threads: {}", args.threads);
    println!("Duration: {}s", args.duration);
    println!("Buffers: {} in {} buckets", args.nbuf, args.nbuckets);
    println!("Pages: {} on {} cpus", args.pages, args.ncpu);
    println!();

    if args.threads > args.nbuf {
        return Err(format!(
            "{} threads could exhaust a pool of {} buffers",
            args.threads, args.nbuf
        )
        .into());
    }

    let scenario: Arc<dyn Scenario> = match args.scenario.as_str() {
        "cache_hot" => Arc::new(scenarios::CacheHot::new(args.nbuf)),
        "cache_churn" => Arc::new(scenarios::CacheChurn::new(args.blocks)),
        "kalloc_local" => Arc::new(scenarios::KallocLocal),
        "kalloc_steal" => Arc::new(scenarios::KallocSteal::new()),
        _ => {
            eprintln!("Unknown scenario: {}", args.scenario);
            std::process::exit(1);
        }
    };

    println!("Initializing...");
    let env = Arc::new(build_env(&args)?);
    scenario.prepare(&env, args.threads)?;
    println!("Initialization complete.");

    let stop_flag = Arc::new(AtomicBool::new(false));
    let metrics = Arc::new(Metrics::new());
    let duration = Duration::from_secs(args.duration);

    if args.warmup > 0 {
        println!("Warming up for {}s...", args.warmup);
        std::thread::sleep(Duration::from_secs(args.warmup));
    }

    println!("Running benchmark {}...", scenario.name());
    let start_time = Instant::now();

    let handles: Vec<_> = (0..args.threads)
        .map(|i| {
            let scenario = Arc::clone(&scenario);
            let env = Arc::clone(&env);
            let stop = Arc::clone(&stop_flag);
            let metrics = Arc::clone(&metrics);
            let thread_args = args.clone();
            std::thread::spawn(move || run_thread(i, scenario, env, stop, metrics, thread_args))
        })
        .collect();

    std::thread::sleep(duration);
    stop_flag.store(true, Ordering::Relaxed);

    for handle in handles {
        let _ = handle.join();
    }

    let elapsed = start_time.elapsed();

    let stats = env.cache.stats();

    println!();
    println!("Statistics:");
    println!(
        "    operations:        {:>12} ({:.1} ops/s)",
        metrics.total_ops(),
        metrics.ops_per_sec(elapsed)
    );
    println!(
        "    latency:           {:8.2} us (avg), {:8.2} us (max)",
        metrics.avg_latency_us(),
        metrics.max_latency_us()
    );
    println!("    errors:            {:>12}", metrics.total_errors());
    println!("    cache:");
    println!("        hits:          {:>12}", stats.hits);
    println!("        misses:        {:>12}", stats.misses);
    println!("        evictions:     {:>12}", stats.evictions);
    println!("    kalloc:");
    println!(
        "        free pages:    {:>12} of {}",
        env.kalloc.free_pages(),
        env.kalloc.total_pages()
    );
    println!("    threads: {}", args.threads);
    Ok(())
}
