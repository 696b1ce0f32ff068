//! Startup configuration for the block cache and the page allocator.

use crate::types::{KERNEL_END, NBUCKETS, NBUF, NCPU, PAGE_SIZE, PHYSTOP, pg_round_down, pg_round_up};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::path::Path;

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error while reading a configuration file
    IoError(std::io::Error),
    /// Malformed JSON
    ParseError(serde_json::Error),
    /// Well-formed but unusable value
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(err) => write!(f, "I/O error: {}", err),
            ConfigError::ParseError(err) => write!(f, "Parse error: {}", err),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid value: {}", msg),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ConfigError::IoError(err) => Some(err),
            ConfigError::ParseError(err) => Some(err),
            ConfigError::InvalidValue(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::ParseError(err)
    }
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Block cache sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of buffer slots in the pool
    pub nbuf: usize,
    /// Number of hash buckets
    pub nbuckets: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            nbuf: NBUF,
            nbuckets: NBUCKETS,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.nbuf == 0 {
            return Err(ConfigError::InvalidValue("nbuf must be positive".to_string()));
        }
        if self.nbuckets == 0 {
            return Err(ConfigError::InvalidValue(
                "nbuckets must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Page allocator layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KallocConfig {
    /// First address after the kernel image
    pub kernel_end: usize,
    /// Top of managed physical memory
    pub phys_top: usize,
    /// Number of CPUs, one free list each
    pub ncpu: usize,
}

impl Default for KallocConfig {
    fn default() -> Self {
        Self {
            kernel_end: KERNEL_END,
            phys_top: PHYSTOP,
            ncpu: NCPU,
        }
    }
}

impl KallocConfig {
    /// First managed page
    pub fn base(&self) -> usize {
        pg_round_up(self.kernel_end)
    }

    /// End of the last whole managed page
    pub fn end(&self) -> usize {
        pg_round_down(self.phys_top)
    }

    /// Number of whole pages in `[kernel_end, phys_top)`
    pub fn total_pages(&self) -> usize {
        self.end().saturating_sub(self.base()) / PAGE_SIZE
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.ncpu == 0 {
            return Err(ConfigError::InvalidValue("ncpu must be positive".to_string()));
        }
        if self.kernel_end >= self.phys_top {
            return Err(ConfigError::InvalidValue(format!(
                "kernel_end {:#x} is not below phys_top {:#x}",
                self.kernel_end, self.phys_top
            )));
        }
        if self.kernel_end > usize::MAX - PAGE_SIZE {
            return Err(ConfigError::InvalidValue(format!(
                "kernel_end {:#x} overflows when page aligned",
                self.kernel_end
            )));
        }
        if self.base() > self.end() {
            return Err(ConfigError::InvalidValue(format!(
                "no whole page between kernel_end {:#x} and phys_top {:#x}",
                self.kernel_end, self.phys_top
            )));
        }
        Ok(())
    }
}

/// Complete startup configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    pub cache: CacheConfig,
    pub kalloc: KallocConfig,
}

impl KernelConfig {
    /// Parses and validates a JSON configuration; missing fields take their defaults
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: KernelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        self.cache.validate()?;
        self.kalloc.validate()
    }
}
