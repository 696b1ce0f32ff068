//! Tick source used as the block cache's LRU clock.

use std::sync::atomic::{AtomicU64, Ordering};

/// A monotonically increasing logical clock
pub trait TickSource: Send + Sync {
    /// Current tick count
    fn now(&self) -> u64;
}

/// Tick counter advanced by the timer interrupt.
///
/// Hosted code and tests advance it explicitly with [`Ticks::tick`], which makes
/// recency ordering fully scriptable.
#[derive(Debug, Default)]
pub struct Ticks {
    ticks: AtomicU64,
}

impl Ticks {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// Advances the clock by one tick and returns the new value
    pub fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Advances the clock by `n` ticks and returns the new value
    pub fn advance(&self, n: u64) -> u64 {
        self.ticks.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Number of ticks since start
    pub fn uptime(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl TickSource for Ticks {
    fn now(&self) -> u64 {
        self.uptime()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_monotonic() {
        let ticks = Ticks::new();
        assert_eq!(ticks.now(), 0);
        assert_eq!(ticks.tick(), 1);
        assert_eq!(ticks.advance(5), 6);
        assert_eq!(ticks.uptime(), 6);
        assert_eq!(ticks.now(), 6);
    }
}
