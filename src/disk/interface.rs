//! Disk interface definitions

use crate::disk::error::DiskResult;
use crate::types::BlockKey;
use std::fmt;

/// Direction of a block transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Disk to memory
    Read,
    /// Memory to disk
    Write,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Read => write!(f, "read"),
            Direction::Write => write!(f, "write"),
        }
    }
}

/// Block device trait
/// This trait is the disk driver seam consumed by the block cache
pub trait BlockDevice: Send + Sync {
    /// Synchronously transfer one block between the device and `buf`
    ///
    /// # Arguments
    /// * `key` - The block to transfer
    /// * `buf` - Exactly `BLOCK_SIZE` bytes; filled on `Read`, copied out on `Write`
    /// * `direction` - Transfer direction
    ///
    /// # Returns
    /// * `Ok(())` once the transfer has completed
    /// * `Err(DiskError)` if the device failed
    fn transfer(&self, key: BlockKey, buf: &mut [u8], direction: Direction) -> DiskResult<()>;
}
