//! Physical page allocator
//!
//! The managed range `[pg_round_up(kernel_end), pg_round_down(phys_top))` is split into
//! one contiguous partition per CPU. Each partition owns a free list under its own spin
//! lock, so CPUs allocate and free in parallel. A CPU whose list runs dry steals a page
//! from the other lists, probing them in ascending CPU order.
//!
//! A freed page always returns to the list of the partition containing it, whichever
//! CPU frees it.

mod freelist;
pub mod memory;

use crate::config::{ConfigResult, KallocConfig};
use crate::cpu;
use crate::infrastructure::lwlock::SpinLock;
use crate::types::{ALLOC_FILL, FREE_FILL, PAGE_SIZE, PhysAddr, pg_round_up};
use freelist::FreeList;
use memory::{FrameFlag, PageGuard, PhysicalMemory};
use std::error::Error;
use std::fmt;

/// Page allocator errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Every free list is empty
    OutOfMemory,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory => write!(f, "Out of memory"),
        }
    }
}

impl Error for AllocError {}

/// Result type for page allocation
pub type AllocResult<T> = Result<T, AllocError>;

/// Per-CPU page allocator over emulated physical memory
pub struct Kalloc {
    memory: PhysicalMemory,
    lists: Box<[SpinLock<FreeList>]>,
    kernel_end: usize,
    /// Pages per partition; the last partition may be short
    per_cpu: usize,
}

impl Kalloc {
    /// Builds the free lists and frees every page of the managed range
    pub fn new(config: KallocConfig) -> ConfigResult<Self> {
        config.validate()?;

        let total = config.total_pages();
        let per_cpu = total.div_ceil(config.ncpu).max(1);
        let kalloc = Kalloc {
            memory: PhysicalMemory::new(config.base(), total),
            lists: (0..config.ncpu)
                .map(|_| SpinLock::named("kmem", FreeList::new()))
                .collect(),
            kernel_end: config.kernel_end,
            per_cpu,
        };

        kalloc.free_range(
            PhysAddr::new(config.kernel_end),
            PhysAddr::new(config.end()),
        );

        log::info!(
            "kalloc: {} pages in [{}, {}), {} per cpu on {} cpus",
            total,
            PhysAddr::new(kalloc.memory.base()),
            PhysAddr::new(kalloc.memory.end()),
            per_cpu,
            config.ncpu
        );
        Ok(kalloc)
    }

    /// Frees every whole page in `[start, end)`
    pub fn free_range(&self, start: PhysAddr, end: PhysAddr) {
        let end = end.as_usize();
        let mut page = pg_round_up(start.as_usize());
        while let Some(next) = page.checked_add(PAGE_SIZE).filter(|&next| next <= end) {
            self.free(PhysAddr::new(page));
            page = next;
        }
    }

    pub fn ncpu(&self) -> usize {
        self.lists.len()
    }

    /// Number of pages in the managed range
    pub fn total_pages(&self) -> usize {
        self.memory.pages()
    }

    /// Pages currently free across all CPUs
    pub fn free_pages(&self) -> usize {
        self.lists.iter().map(|list| list.lock().len()).sum()
    }

    /// Pages currently on `cpu`'s free list
    pub fn free_pages_on(&self, cpu: usize) -> usize {
        self.lists[cpu].lock().len()
    }

    /// Partition owning the managed page at `addr`
    pub fn home_of(&self, addr: PhysAddr) -> Option<usize> {
        self.memory
            .page_index(addr.as_usize())
            .map(|index| index / self.per_cpu)
    }

    /// Returns the page at `addr` to its home partition's free list.
    ///
    /// # Panics
    /// Panics if `addr` is not a page-aligned address inside the managed range, or if
    /// the page is already free.
    pub fn free(&self, addr: PhysAddr) {
        let pa = addr.as_usize();
        let frame = match self.memory.frame(pa) {
            Some(frame) if addr.is_page_aligned() && pa >= self.kernel_end => frame,
            _ => {
                log::error!(
                    "kalloc: free of {} outside [{}, {})",
                    addr,
                    PhysAddr::new(self.memory.base()),
                    PhysAddr::new(self.memory.end())
                );
                panic!("kfree: invalid address {}", addr);
            }
        };

        if frame.flags.test_and_set(FrameFlag::Free) {
            log::error!("kalloc: double free of {}", addr);
            panic!("kfree: double free of {}", addr);
        }

        // Fill with junk to catch dangling references
        frame.lock().fill(FREE_FILL);

        let home = (pa - self.memory.base()) / PAGE_SIZE / self.per_cpu;
        self.lists[home].lock().push(&self.memory, pa);
    }

    /// Allocates one page for the calling CPU
    pub fn alloc(&self) -> AllocResult<PhysAddr> {
        self.alloc_on(cpu::current() % self.lists.len())
    }

    /// Allocates one page on behalf of `cpu`, stealing from other CPUs if its own list
    /// is empty
    ///
    /// # Returns
    /// * `Ok(PhysAddr)` - A page filled with `ALLOC_FILL`
    /// * `Err(AllocError::OutOfMemory)` - Every list was empty
    pub fn alloc_on(&self, cpu: usize) -> AllocResult<PhysAddr> {
        assert!(
            cpu < self.lists.len(),
            "kalloc: cpu {} out of range ({} cpus)",
            cpu,
            self.lists.len()
        );

        let pa = match self.pop(cpu) {
            Some(pa) => pa,
            None => self.steal(cpu).ok_or(AllocError::OutOfMemory)?,
        };

        if let Some(frame) = self.memory.frame(pa) {
            frame.lock().fill(ALLOC_FILL);
        }
        Ok(PhysAddr::new(pa))
    }

    /// Pops the head of `cpu`'s list and marks it allocated
    fn pop(&self, cpu: usize) -> Option<usize> {
        let pa = self.lists[cpu].lock().pop(&self.memory)?;
        if let Some(frame) = self.memory.frame(pa) {
            frame.flags.test_and_clear(FrameFlag::Free);
        }
        Some(pa)
    }

    fn steal(&self, cpu: usize) -> Option<usize> {
        (0..self.lists.len())
            .filter(|&victim| victim != cpu)
            .find_map(|victim| {
                let pa = self.pop(victim)?;
                log::debug!(
                    "kalloc: cpu {} stole {} from cpu {}",
                    cpu,
                    PhysAddr::new(pa),
                    victim
                );
                Some(pa)
            })
    }

    /// Bytes of the allocated page at `addr`; `None` if it is free or unmanaged
    pub fn page(&self, addr: PhysAddr) -> Option<PageGuard<'_>> {
        if !addr.is_page_aligned() {
            return None;
        }
        let frame = self.memory.frame(addr.as_usize())?;
        if frame.flags.test(FrameFlag::Free) {
            return None;
        }
        Some(frame.lock())
    }
}

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
