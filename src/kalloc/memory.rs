//! Emulated physical memory
//!
//! The hosted kernel has no raw physical memory to hand out, so the managed range is
//! backed by one heap-allocated frame per page. Each frame carries its bytes and a
//! state flag recording whether the page currently sits on a free list.

use crate::infrastructure::lwlock::{SpinLock, SpinLockGuard};
use crate::types::PAGE_SIZE;
use std::sync::atomic::{AtomicU8, Ordering};

/// Bytes of one page, locked
pub type PageGuard<'a> = SpinLockGuard<'a, [u8; PAGE_SIZE]>;

/// State bits of a frame
#[derive(Debug, Clone, Copy)]
#[repr(u8)]
pub enum FrameFlag {
    /// Frame is on a free list
    Free = 1 << 0,
}

/// Atomic flags for a physical frame
#[derive(Debug, Default)]
pub struct FrameFlags(AtomicU8);

impl FrameFlags {
    pub const fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    /// Sets `flag` and returns whether it was already set
    pub fn test_and_set(&self, flag: FrameFlag) -> bool {
        let mask = flag as u8;
        self.0.fetch_or(mask, Ordering::AcqRel) & mask != 0
    }

    /// Clears `flag` and returns whether it was set
    pub fn test_and_clear(&self, flag: FrameFlag) -> bool {
        let mask = flag as u8;
        self.0.fetch_and(!mask, Ordering::AcqRel) & mask != 0
    }

    pub fn test(&self, flag: FrameFlag) -> bool {
        self.0.load(Ordering::Acquire) & flag as u8 != 0
    }
}

/// One page of emulated memory
pub struct Frame {
    pub flags: FrameFlags,
    bytes: SpinLock<[u8; PAGE_SIZE]>,
}

impl Frame {
    fn new() -> Self {
        Frame {
            flags: FrameFlags::new(),
            bytes: SpinLock::named("frame", [0u8; PAGE_SIZE]),
        }
    }

    pub fn lock(&self) -> PageGuard<'_> {
        self.bytes.lock()
    }
}

/// Page-granular memory covering `[base, base + pages * PAGE_SIZE)`
pub struct PhysicalMemory {
    base: usize,
    frames: Box<[Frame]>,
}

impl PhysicalMemory {
    /// Creates `pages` frames starting at the page-aligned address `base`.
    /// Every frame starts out allocated.
    pub fn new(base: usize, pages: usize) -> Self {
        debug_assert_eq!(base % PAGE_SIZE, 0);
        PhysicalMemory {
            base,
            frames: (0..pages).map(|_| Frame::new()).collect(),
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// One past the last emulated byte
    pub fn end(&self) -> usize {
        self.base + self.frames.len() * PAGE_SIZE
    }

    pub fn pages(&self) -> usize {
        self.frames.len()
    }

    /// Index of the page containing `addr`, if it is emulated
    pub fn page_index(&self, addr: usize) -> Option<usize> {
        if addr < self.base || addr >= self.end() {
            return None;
        }
        Some((addr - self.base) / PAGE_SIZE)
    }

    /// Frame of the page starting at `addr`, if it is emulated
    pub fn frame(&self, addr: usize) -> Option<&Frame> {
        self.page_index(addr).map(|index| &self.frames[index])
    }
}
