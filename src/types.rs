//! Global type definitions
//!
//! Stores constants, identity types and address helpers shared by the block cache
//! and the page allocator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Disk block size in bytes
pub const BLOCK_SIZE: usize = 1024;

/// Physical page size in bytes
pub const PAGE_SIZE: usize = 4096;

/// Default number of buffer slots in the block cache
pub const NBUF: usize = 30;

/// Default number of hash buckets, kept prime and independent of NBUF
pub const NBUCKETS: usize = 13;

/// Default number of CPUs
pub const NCPU: usize = 8;

/// Start of physical RAM
pub const KERNBASE: usize = 0x8000_0000;

/// Default top of managed physical RAM
pub const PHYSTOP: usize = KERNBASE + 16 * 1024 * 1024;

/// Default end of the kernel image
pub const KERNEL_END: usize = KERNBASE + 1024 * 1024;

/// Byte written over a page when it is freed
pub const FREE_FILL: u8 = 0x01;

/// Byte written over a page when it is handed out
pub const ALLOC_FILL: u8 = 0x05;

/// Rounds an address up to the next page boundary
#[inline]
pub const fn pg_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Rounds an address down to a page boundary
#[inline]
pub const fn pg_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Identity of an on-disk block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockKey {
    /// Device number
    pub dev: u32,
    /// Block number within the device
    pub blockno: u32,
}

impl BlockKey {
    #[inline]
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.dev, self.blockno)
    }
}

/// A physical memory address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    #[inline]
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns true if the address sits on a page boundary
    #[inline]
    pub const fn is_page_aligned(self) -> bool {
        self.0 % PAGE_SIZE == 0
    }
}

impl From<usize> for PhysAddr {
    #[inline]
    fn from(addr: usize) -> Self {
        Self(addr)
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
