//! Benchmark scenarios module

use kresource::clock::Ticks;
use kresource::infrastructure::lwlock::SpinLock;
use kresource::types::PhysAddr;
use kresource::{BlockCache, Kalloc};
use rand::Rng;
use std::error::Error;
use std::sync::Arc;

/// Resource pools shared by every worker
pub struct Env {
    pub cache: Arc<BlockCache>,
    pub kalloc: Arc<Kalloc>,
    pub ticks: Arc<Ticks>,
}

/// Scenario trait - defines a benchmark scenario
pub trait Scenario: Send + Sync {
    /// Prepare scenario (warm the cache, reserve pages, etc.)
    fn prepare(&self, env: &Env, threads: usize) -> Result<(), Box<dyn Error>>;

    /// Execute one iteration of the scenario
    fn execute(&self, env: &Env, rng: &mut rand::rngs::StdRng) -> Result<(), Box<dyn Error>>;

    /// Get scenario name
    fn name(&self) -> &str;
}

/// Cache hot scenario - random reads over a working set that fits in the pool
pub struct CacheHot {
    blocks: u32,
}

impl CacheHot {
    pub fn new(nbuf: usize) -> Self {
        Self {
            blocks: (nbuf / 2).max(1) as u32,
        }
    }
}

impl Scenario for CacheHot {
    fn prepare(&self, env: &Env, _threads: usize) -> Result<(), Box<dyn Error>> {
        for blockno in 0..self.blocks {
            env.cache.bread(1, blockno)?;
        }
        Ok(())
    }

    fn execute(&self, env: &Env, rng: &mut rand::rngs::StdRng) -> Result<(), Box<dyn Error>> {
        env.ticks.tick();
        let buf = env.cache.bread(1, rng.gen_range(0..self.blocks))?;
        std::hint::black_box(buf.data()[0]);
        Ok(())
    }

    fn name(&self) -> &str {
        "cache_hot"
    }
}

/// Cache churn scenario - read-modify-write over a working set larger than the pool
pub struct CacheChurn {
    blocks: u32,
}

impl CacheChurn {
    pub fn new(blocks: u32) -> Self {
        Self {
            blocks: blocks.max(1),
        }
    }
}

impl Scenario for CacheChurn {
    fn prepare(&self, _env: &Env, _threads: usize) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn execute(&self, env: &Env, rng: &mut rand::rngs::StdRng) -> Result<(), Box<dyn Error>> {
        env.ticks.tick();
        let mut buf = env.cache.bread(1, rng.gen_range(0..self.blocks))?;
        let data = buf.data_mut();
        data[0] = data[0].wrapping_add(1);
        buf.write()?;
        Ok(())
    }

    fn name(&self) -> &str {
        "cache_churn"
    }
}

/// Kalloc local scenario - alloc/free pairs served by the worker's own list
pub struct KallocLocal;

impl Scenario for KallocLocal {
    fn prepare(&self, _env: &Env, _threads: usize) -> Result<(), Box<dyn Error>> {
        Ok(())
    }

    fn execute(&self, env: &Env, _rng: &mut rand::rngs::StdRng) -> Result<(), Box<dyn Error>> {
        let page = env.kalloc.alloc()?;
        env.kalloc.free(page);
        Ok(())
    }

    fn name(&self) -> &str {
        "kalloc_local"
    }
}

/// Kalloc steal scenario - worker lists are drained up front, so every allocation
/// steals from an idle CPU
pub struct KallocSteal {
    reserved: SpinLock<Vec<PhysAddr>>,
}

impl KallocSteal {
    pub fn new() -> Self {
        Self {
            reserved: SpinLock::named("bench.reserved", Vec::new()),
        }
    }
}

impl Scenario for KallocSteal {
    fn prepare(&self, env: &Env, threads: usize) -> Result<(), Box<dyn Error>> {
        let kalloc = &env.kalloc;
        if threads >= kalloc.ncpu() {
            return Err(format!(
                "kalloc_steal needs fewer threads ({}) than cpus ({})",
                threads,
                kalloc.ncpu()
            )
            .into());
        }

        let mut reserved = self.reserved.lock();
        for cpu in 0..threads {
            for _ in 0..kalloc.free_pages_on(cpu) {
                reserved.push(kalloc.alloc_on(cpu)?);
            }
        }
        Ok(())
    }

    fn execute(&self, env: &Env, _rng: &mut rand::rngs::StdRng) -> Result<(), Box<dyn Error>> {
        let page = env.kalloc.alloc()?;
        env.kalloc.free(page);
        Ok(())
    }

    fn name(&self) -> &str {
        "kalloc_steal"
    }
}
