//! Disk module
//!
//! This module provides the block device interface the buffer cache performs its I/O
//! through, with an in-memory device and a file-backed device that wraps glibc system
//! calls.

// Re-export error types and result type
pub mod error;
pub use error::{DiskError, DiskResult};

// Re-export interface traits
pub mod interface;
pub use interface::{BlockDevice, Direction};

// Re-export device implementations
pub mod file;
pub mod mem;
pub use file::FileDisk;
pub use mem::MemDisk;

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
