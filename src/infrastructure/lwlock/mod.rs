// LWLock - Lightweight Lock implementations
// This module provides the two lock classes used by the kernel core behind one interface:
// a busy-waiting spin lock for short metadata critical sections and a parking sleep lock
// that may be held across disk I/O.

use parking_lot::{Mutex as ParkingLotMutex, MutexGuard as ParkingLotMutexGuard};
use spin::{Mutex as SpinMutex, MutexGuard as SpinMutexGuard};

/// Guard returned by [`SpinLock::lock`]
pub type SpinLockGuard<'a, T> = SpinMutexGuard<'a, T>;

/// Guard returned by [`SleepLock::lock`]
pub type SleepLockGuard<'a, T> = ParkingLotMutexGuard<'a, T>;

/// A trait that defines a unified interface for basic locks
pub trait LockInterface<T> {
    /// The guard type for exclusive locks
    type Guard<'a> where Self: 'a, T: 'a;

    /// Creates a new lock with the given initial value
    fn new(data: T) -> Self;

    /// Acquires an exclusive lock
    fn lock(&self) -> Self::Guard<'_>;

    /// Returns true if some context currently holds the lock
    fn is_locked(&self) -> bool;
}

/// Fast, non-suspending mutual exclusion.
///
/// A blocked acquirer busy-waits. Critical sections must be short and must never
/// perform I/O or take a [`SleepLock`].
pub struct SpinLock<T> {
    name: &'static str,
    inner: SpinMutex<T>,
}

impl<T> SpinLock<T> {
    pub fn named(name: &'static str, data: T) -> Self {
        SpinLock {
            name,
            inner: SpinMutex::new(data),
        }
    }

    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<SpinLockGuard<'_, T>> {
        self.inner.try_lock()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> LockInterface<T> for SpinLock<T> {
    type Guard<'a> = SpinLockGuard<'a, T> where T: 'a;

    fn new(data: T) -> Self {
        SpinLock::named("spinlock", data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock()
    }

    fn is_locked(&self) -> bool {
        self.is_locked()
    }
}

/// Blocking mutual exclusion.
///
/// The holder may suspend with the lock held. Waiters are parked and woken on release
/// instead of spinning.
pub struct SleepLock<T> {
    name: &'static str,
    inner: ParkingLotMutex<T>,
}

impl<T> SleepLock<T> {
    pub fn named(name: &'static str, data: T) -> Self {
        SleepLock {
            name,
            inner: ParkingLotMutex::new(data),
        }
    }

    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        self.inner.lock()
    }

    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        self.inner.try_lock()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> LockInterface<T> for SleepLock<T> {
    type Guard<'a> = SleepLockGuard<'a, T> where T: 'a;

    fn new(data: T) -> Self {
        SleepLock::named("sleeplock", data)
    }

    fn lock(&self) -> Self::Guard<'_> {
        self.lock()
    }

    fn is_locked(&self) -> bool {
        self.is_locked()
    }
}
