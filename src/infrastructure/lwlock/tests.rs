use super::*;
use std::sync::Arc;
use std::thread;

const THREADS: usize = 4;
const OPERATIONS_PER_THREAD: usize = 10_000;

// Spawns THREADS workers that each bump the counter behind `bump`
fn hammer(bump: Arc<dyn Fn() + Send + Sync>) {
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let bump = bump.clone();
            thread::spawn(move || {
                for _ in 0..OPERATIONS_PER_THREAD {
                    bump();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_spinlock_mutual_exclusion() {
    let lock = Arc::new(<SpinLock<usize> as LockInterface<usize>>::new(0));
    let counter = lock.clone();
    hammer(Arc::new(move || *counter.lock() += 1));
    assert_eq!(*lock.lock(), THREADS * OPERATIONS_PER_THREAD);
}

#[test]
fn test_sleeplock_mutual_exclusion() {
    let lock = Arc::new(<SleepLock<usize> as LockInterface<usize>>::new(0));
    let counter = lock.clone();
    hammer(Arc::new(move || *counter.lock() += 1));
    assert_eq!(*lock.lock(), THREADS * OPERATIONS_PER_THREAD);
}

#[test]
fn test_is_locked_tracks_guard() {
    let spin = SpinLock::named("bcache.bucket", 0u32);
    assert!(!spin.is_locked());
    {
        let _guard = spin.lock();
        assert!(spin.is_locked());
        assert!(spin.try_lock().is_none());
    }
    assert!(!spin.is_locked());

    let sleep = SleepLock::named("buffer", 0u32);
    {
        let _guard = sleep.lock();
        assert!(sleep.is_locked());
        assert!(sleep.try_lock().is_none());
    }
    assert!(!sleep.is_locked());
}

#[test]
fn test_lock_names() {
    assert_eq!(SpinLock::named("kmem", ()).name(), "kmem");
    assert_eq!(SleepLock::named("buffer", ()).name(), "buffer");
    assert_eq!(<SpinLock<()> as LockInterface<()>>::new(()).name(), "spinlock");
}
