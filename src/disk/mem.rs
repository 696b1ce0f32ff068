//! In-memory block device

use crate::disk::error::{DiskError, DiskResult};
use crate::disk::interface::{BlockDevice, Direction};
use crate::types::{BLOCK_SIZE, BlockKey};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// RAM-backed disk.
///
/// Blocks never written read back as zeros. Every transfer is counted so callers can
/// observe how often the cache actually reaches the device.
#[derive(Default)]
pub struct MemDisk {
    blocks: Mutex<HashMap<BlockKey, Box<[u8; BLOCK_SIZE]>>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MemDisk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed read transfers
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Number of completed write transfers
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Stores a block directly, bypassing the transfer counters
    pub fn poke(&self, key: BlockKey, data: &[u8; BLOCK_SIZE]) {
        self.blocks.lock().insert(key, Box::new(*data));
    }

    /// Copy of a block's current on-disk contents
    pub fn peek(&self, key: BlockKey) -> [u8; BLOCK_SIZE] {
        self.blocks
            .lock()
            .get(&key)
            .map(|block| **block)
            .unwrap_or([0u8; BLOCK_SIZE])
    }
}

impl BlockDevice for MemDisk {
    fn transfer(&self, key: BlockKey, buf: &mut [u8], direction: Direction) -> DiskResult<()> {
        if buf.len() != BLOCK_SIZE {
            return Err(DiskError::InvalidArgument(format!(
                "transfer buffer is {} bytes, expected {}",
                buf.len(),
                BLOCK_SIZE
            )));
        }

        let mut blocks = self.blocks.lock();
        match direction {
            Direction::Read => {
                match blocks.get(&key) {
                    Some(block) => buf.copy_from_slice(&block[..]),
                    None => buf.fill(0),
                }
                self.reads.fetch_add(1, Ordering::Relaxed);
            }
            Direction::Write => {
                let block = blocks
                    .entry(key)
                    .or_insert_with(|| Box::new([0u8; BLOCK_SIZE]));
                block.copy_from_slice(buf);
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }
}
