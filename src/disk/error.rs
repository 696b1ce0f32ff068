//! Disk error definitions

use std::error::Error;
use std::fmt;

/// Disk error types
#[derive(Debug)]
pub enum DiskError {
    /// Device does not exist or cannot be opened
    NoDevice(u32),
    /// Buffer handed to a transfer has the wrong size
    InvalidArgument(String),
    /// I/O error
    IoError(std::io::Error),
    /// System call error with error code
    SystemError(i32, String),
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiskError::NoDevice(dev) => write!(f, "No such device: {}", dev),
            DiskError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            DiskError::IoError(err) => write!(f, "I/O error: {}", err),
            DiskError::SystemError(errno, msg) => {
                write!(f, "System error (errno {}): {}", errno, msg)
            }
        }
    }
}

impl Error for DiskError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DiskError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DiskError {
    fn from(err: std::io::Error) -> Self {
        DiskError::IoError(err)
    }
}

impl From<std::ffi::NulError> for DiskError {
    fn from(err: std::ffi::NulError) -> Self {
        DiskError::InvalidArgument(err.to_string())
    }
}

/// Result type for disk operations
pub type DiskResult<T> = Result<T, DiskError>;
