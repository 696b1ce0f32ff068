//! Kernel resource management library
//!
//! Two shared resource pools of a small teaching kernel: a sharded block cache over a
//! disk device and a per-CPU physical page allocator.

// Global type definitions
pub mod types;

// Import various modules
pub mod buffer;
pub mod clock;
pub mod config;
pub mod console;
pub mod cpu;
pub mod disk;
pub mod infrastructure;
pub mod kalloc;

// Re-export the resource pools for easier access
pub use buffer::{BlockCache, BufGuard};
pub use kalloc::{AllocError, Kalloc};

// Re-export configuration items
pub use config::{ConfigError, KernelConfig};
