//! File-backed block device using glibc system calls

use crate::disk::error::{DiskError, DiskResult};
use crate::disk::interface::{BlockDevice, Direction};
use crate::types::{BLOCK_SIZE, BlockKey};
use libc::{self, c_int, c_void, off_t, size_t};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

fn last_errno() -> i32 {
    std::io::Error::last_os_error().raw_os_error().unwrap_or(0)
}

/// Disk whose devices are image files in one directory.
///
/// Device `d` lives in `<dir>/disk<d>.img`; block `b` sits at byte offset
/// `b * BLOCK_SIZE`. Reads past the end of an image return zeros.
pub struct FileDisk {
    dir: PathBuf,
    fds: Mutex<HashMap<u32, c_int>>,
}

impl FileDisk {
    /// Create a FileDisk rooted at `dir`, which must already exist
    pub fn new(dir: impl Into<PathBuf>) -> DiskResult<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(DiskError::InvalidArgument(format!(
                "disk directory '{}' does not exist",
                dir.display()
            )));
        }
        Ok(FileDisk {
            dir,
            fds: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the image file backing `dev`
    pub fn image_path(&self, dev: u32) -> PathBuf {
        self.dir.join(format!("disk{}.img", dev))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the descriptor for `dev`, opening (and creating) its image on first use
    fn fd(&self, dev: u32) -> DiskResult<c_int> {
        let mut fds = self.fds.lock();
        if let Some(fd) = fds.get(&dev) {
            return Ok(*fd);
        }

        let path = self.image_path(dev);
        let c_path = std::ffi::CString::new(path.to_string_lossy().as_bytes())?;
        let fd = unsafe { libc::open(c_path.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o644) };

        if fd < 0 {
            let errno = last_errno();
            match errno {
                libc::ENOENT | libc::EACCES | libc::EPERM => Err(DiskError::NoDevice(dev)),
                _ => Err(DiskError::SystemError(
                    errno,
                    format!("open failed for '{}'", path.display()),
                )),
            }
        } else {
            log::debug!("disk: opened device {} at {}", dev, path.display());
            fds.insert(dev, fd);
            Ok(fd)
        }
    }

    fn read_block(&self, fd: c_int, buf: &mut [u8], offset: u64) -> DiskResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let result = unsafe {
                libc::pread(
                    fd,
                    buf[done..].as_mut_ptr() as *mut c_void,
                    (buf.len() - done) as size_t,
                    (offset + done as u64) as off_t,
                )
            };

            if result < 0 {
                let errno = last_errno();
                if errno == libc::EINTR {
                    continue;
                }
                return Err(DiskError::SystemError(errno, "pread failed".to_string()));
            }
            if result == 0 {
                // Past the end of the image: the rest of the block was never written
                buf[done..].fill(0);
                break;
            }
            done += result as usize;
        }
        Ok(())
    }

    fn write_block(&self, fd: c_int, buf: &[u8], offset: u64) -> DiskResult<()> {
        let mut done = 0;
        while done < buf.len() {
            let result = unsafe {
                libc::pwrite(
                    fd,
                    buf[done..].as_ptr() as *const c_void,
                    (buf.len() - done) as size_t,
                    (offset + done as u64) as off_t,
                )
            };

            if result < 0 {
                let errno = last_errno();
                if errno == libc::EINTR {
                    continue;
                }
                return Err(DiskError::SystemError(errno, "pwrite failed".to_string()));
            }
            done += result as usize;
        }
        Ok(())
    }
}

impl BlockDevice for FileDisk {
    fn transfer(&self, key: BlockKey, buf: &mut [u8], direction: Direction) -> DiskResult<()> {
        if buf.len() != BLOCK_SIZE {
            return Err(DiskError::InvalidArgument(format!(
                "transfer buffer is {} bytes, expected {}",
                buf.len(),
                BLOCK_SIZE
            )));
        }

        let fd = self.fd(key.dev)?;
        let offset = key.blockno as u64 * BLOCK_SIZE as u64;
        match direction {
            Direction::Read => self.read_block(fd, buf, offset),
            Direction::Write => self.write_block(fd, buf, offset),
        }
    }
}

impl Drop for FileDisk {
    fn drop(&mut self) {
        for (_, fd) in self.fds.lock().drain() {
            let _ = unsafe { libc::close(fd) };
        }
    }
}
