//! Current-CPU identity.
//!
//! Every execution context runs on exactly one logical CPU. Hosted threads start on
//! CPU 0 and are moved with [`set_current`] or scoped with [`CpuGuard`].

use std::cell::Cell;

thread_local! {
    static CPU_ID: Cell<usize> = const { Cell::new(0) };
}

/// Returns the id of the CPU the caller runs on
#[inline]
pub fn current() -> usize {
    CPU_ID.with(|id| id.get())
}

/// Binds the calling context to `cpu`
pub fn set_current(cpu: usize) {
    CPU_ID.with(|id| id.set(cpu));
}

/// Runs the caller on a given CPU until dropped, then restores the previous one
pub struct CpuGuard {
    previous: usize,
}

impl CpuGuard {
    pub fn bind(cpu: usize) -> Self {
        let previous = current();
        set_current(cpu);
        CpuGuard { previous }
    }
}

impl Drop for CpuGuard {
    fn drop(&mut self) {
        set_current(self.previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_guard_restores() {
        assert_eq!(current(), 0);
        {
            let _cpu = CpuGuard::bind(3);
            assert_eq!(current(), 3);
            {
                let _inner = CpuGuard::bind(1);
                assert_eq!(current(), 1);
            }
            assert_eq!(current(), 3);
        }
        assert_eq!(current(), 0);
    }

    #[test]
    fn test_cpu_id_is_per_thread() {
        set_current(2);
        let other = std::thread::spawn(current).join().unwrap();
        assert_eq!(other, 0);
        assert_eq!(current(), 2);
        set_current(0);
    }
}
