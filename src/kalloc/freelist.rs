// Singly linked free list threaded through the free pages themselves

use super::memory::PhysicalMemory;
use std::mem::size_of;

/// End-of-list marker stored in the link word
const NIL: usize = usize::MAX;

const LINK_BYTES: usize = size_of::<usize>();

/// Head of one CPU's free list.
///
/// The next pointer of each free page lives in the page's first word, so the list needs
/// no storage of its own beyond the head.
pub(crate) struct FreeList {
    head: usize,
    length: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        FreeList {
            head: NIL,
            length: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.length
    }

    /// Pushes the page at `addr`, which the caller has already marked free
    pub(crate) fn push(&mut self, memory: &PhysicalMemory, addr: usize) {
        let Some(frame) = memory.frame(addr) else {
            unreachable!("free list push of unmanaged page {:#x}", addr);
        };
        frame.lock()[..LINK_BYTES].copy_from_slice(&self.head.to_ne_bytes());
        self.head = addr;
        self.length += 1;
    }

    /// Unlinks and returns the head page
    pub(crate) fn pop(&mut self, memory: &PhysicalMemory) -> Option<usize> {
        if self.head == NIL {
            return None;
        }

        let addr = self.head;
        let frame = memory.frame(addr)?;
        let mut link = [0u8; LINK_BYTES];
        link.copy_from_slice(&frame.lock()[..LINK_BYTES]);

        self.head = usize::from_ne_bytes(link);
        self.length -= 1;
        Some(addr)
    }
}
