//! Block cache for the kernel core
//!
//! A fixed pool of buffer slots caches disk blocks. Lookup is sharded across hash
//! buckets, each with its own spin lock and membership list. Victim selection is
//! serialized by one arbiter lock and picks the unreferenced slot with the oldest
//! timestamp, so a never-used slot is always taken before anything is evicted.
//!
//! Lock order, outermost first:
//!
//! ```text
//! arbiter -> bucket locks (ascending index) -> slot metadata locks (ascending index)
//! ```
//!
//! A bucket lock is never held while the arbiter is requested. Slot data locks are
//! sleep locks and are only taken with no spin lock held.

mod bucket;

use crate::clock::TickSource;
use crate::config::{CacheConfig, ConfigResult};
use crate::disk::{BlockDevice, Direction, DiskResult};
use crate::infrastructure::lwlock::{SleepLock, SleepLockGuard, SpinLock, SpinLockGuard};
use crate::types::{BLOCK_SIZE, BlockKey};
use bucket::{BucketList, Link, Linked};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity, reference count and recency of a slot, guarded by the slot's spin lock
#[derive(Debug, Default)]
struct SlotMeta {
    /// Block the slot is bound to; `None` until first use
    key: Option<BlockKey>,
    /// Holders, readers, writers and pinners
    refcnt: u32,
    /// Tick of the last lookup or bind; `None` orders below every real tick
    last_used: Option<u64>,
    /// Bumped on every bind, so each binding of the slot is distinct
    epoch: u64,
}

/// Block contents, guarded by the slot's sleep lock
struct BufData {
    /// Binding (key and epoch) the bytes were last loaded for or written as. The data
    /// is valid exactly when this matches the slot's current binding, so every rebind
    /// invalidates it, even one back to the same key.
    loaded: Option<(BlockKey, u64)>,
    bytes: Box<[u8; BLOCK_SIZE]>,
}

/// One buffer slot
struct Slot {
    meta: SpinLock<SlotMeta>,
    link: Link,
    data: SleepLock<BufData>,
}

impl Slot {
    fn new() -> Self {
        Slot {
            meta: SpinLock::named("bcache.slot", SlotMeta::default()),
            link: Link::new(),
            data: SleepLock::named(
                "buffer",
                BufData {
                    loaded: None,
                    bytes: Box::new([0u8; BLOCK_SIZE]),
                },
            ),
        }
    }
}

impl Linked for Slot {
    fn link(&self) -> &Link {
        &self.link
    }
}

/// Copyable reference to a bound slot, used to pin a buffer past its release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotRef {
    index: usize,
    key: BlockKey,
    epoch: u64,
}

impl SlotRef {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn key(&self) -> BlockKey {
        self.key
    }
}

/// Snapshot of one bound slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    pub slot: usize,
    pub key: BlockKey,
    pub refcnt: u32,
    pub last_used: u64,
}

/// Cache activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Acquires satisfied by an already bound slot
    pub hits: u64,
    /// Acquires that had to bind a slot
    pub misses: u64,
    /// Binds that displaced another block
    pub evictions: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// The block cache
pub struct BlockCache {
    slots: Box<[Slot]>,
    buckets: Box<[SpinLock<BucketList>]>,
    /// Serializes victim selection and binding across all buckets
    arbiter: SpinLock<()>,
    disk: Arc<dyn BlockDevice>,
    ticks: Arc<dyn TickSource>,
    counters: Counters,
}

impl BlockCache {
    /// Creates a cache of `config.nbuf` unbound slots over `disk`
    ///
    /// # Arguments
    /// * `config` - Pool size and bucket count
    /// * `disk` - Device performing the block transfers
    /// * `ticks` - Clock stamping slots on lookup and bind
    pub fn new(
        config: CacheConfig,
        disk: Arc<dyn BlockDevice>,
        ticks: Arc<dyn TickSource>,
    ) -> ConfigResult<Self> {
        config.validate()?;

        let slots = (0..config.nbuf).map(|_| Slot::new()).collect();
        let buckets = (0..config.nbuckets)
            .map(|_| SpinLock::named("bcache.bucket", BucketList::new()))
            .collect();

        log::info!(
            "bcache: {} buffers of {} bytes in {} buckets",
            config.nbuf,
            BLOCK_SIZE,
            config.nbuckets
        );

        Ok(BlockCache {
            slots,
            buckets,
            arbiter: SpinLock::named("bcache", ()),
            disk,
            ticks,
            counters: Counters::default(),
        })
    }

    /// Number of slots in the pool
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of hash buckets
    pub fn nbuckets(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    fn bucket_of(&self, key: BlockKey) -> usize {
        key.blockno as usize % self.buckets.len()
    }

    /// Returns a locked buffer for `(dev, blockno)`, binding a slot if needed.
    ///
    /// The buffer's data may not be valid yet; call [`BufGuard::read`].
    ///
    /// # Panics
    /// Panics if every slot is referenced, since the pool cannot satisfy the request.
    pub fn acquire(&self, dev: u32, blockno: u32) -> BufGuard<'_> {
        let key = BlockKey::new(dev, blockno);
        let (index, epoch) = self.bget(key);

        // May sleep while another holder finishes its I/O
        let data = self.slots[index].data.lock();

        BufGuard {
            data,
            hold: Hold {
                cache: self,
                slot: SlotRef { index, key, epoch },
            },
        }
    }

    /// Acquires `(dev, blockno)` and reads it through from disk if needed
    pub fn bread(&self, dev: u32, blockno: u32) -> DiskResult<BufGuard<'_>> {
        let mut buf = self.acquire(dev, blockno);
        buf.read()?;
        Ok(buf)
    }

    /// Finds or binds the slot for `key` and takes a reference on it.
    /// Returns the slot index and its bind epoch.
    fn bget(&self, key: BlockKey) -> (usize, u64) {
        let bucket = self.bucket_of(key);

        if let Some((index, epoch)) = self.lookup(bucket, key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("bcache: hit {} in slot {}", key, index);
            return (index, epoch);
        }

        let _arbiter = self.arbiter.lock();

        // Another CPU may have bound the block while this one waited for the arbiter
        if let Some((index, epoch)) = self.lookup(bucket, key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            log::trace!("bcache: hit {} in slot {} after waiting", key, index);
            return (index, epoch);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let (index, epoch, previous) = self.claim_victim(key);
        self.relink(index, previous, key);
        log::trace!("bcache: miss {} bound to slot {}", key, index);
        (index, epoch)
    }

    /// Scans `bucket` for `key`; on a hit refreshes the timestamp and takes a reference
    fn lookup(&self, bucket: usize, key: BlockKey) -> Option<(usize, u64)> {
        let list = self.buckets[bucket].lock();
        for index in list.iter(&self.slots) {
            let mut meta = self.slots[index].meta.lock();
            if meta.key == Some(key) {
                meta.refcnt += 1;
                meta.last_used = Some(self.ticks.now());
                return Some((index, meta.epoch));
            }
        }
        None
    }

    /// Picks the unreferenced slot with the oldest timestamp and rebinds it to `key`.
    ///
    /// Must be called with the arbiter held. The best candidate's metadata lock stays
    /// held while the rest of the pool is scanned, so no lookup can reference it
    /// between selection and rebinding. Candidates only ever move to higher indices,
    /// which keeps metadata locks in ascending order. Ties go to the lowest index.
    ///
    /// Returns the slot index, its new bind epoch and the key it was bound to before.
    fn claim_victim(&self, key: BlockKey) -> (usize, u64, Option<BlockKey>) {
        let mut victim: Option<(usize, SpinLockGuard<'_, SlotMeta>)> = None;

        for (index, slot) in self.slots.iter().enumerate() {
            let meta = slot.meta.lock();
            if meta.refcnt != 0 {
                continue;
            }
            let older = match &victim {
                None => true,
                Some((_, best)) => meta.last_used < best.last_used,
            };
            if older {
                victim = Some((index, meta));
            }
        }

        let Some((index, mut meta)) = victim else {
            log::error!(
                "bcache: all {} buffers referenced, cannot cache {}",
                self.slots.len(),
                key
            );
            panic!(
                "bget: no buffers: all {} slots referenced while acquiring {}",
                self.slots.len(),
                key
            );
        };

        let previous = meta.key.replace(key);
        meta.refcnt = 1;
        meta.last_used = Some(self.ticks.now());
        meta.epoch = meta.epoch.wrapping_add(1);
        (index, meta.epoch, previous)
    }

    /// Moves slot `index` into the bucket of `key`.
    ///
    /// Must be called with the arbiter held and after the slot was claimed; the slot
    /// is referenced only by the caller, so no other context touches its links.
    fn relink(&self, index: usize, previous: Option<BlockKey>, key: BlockKey) {
        let to = self.bucket_of(key);

        match previous.map(|old| self.bucket_of(old)) {
            None => {
                self.buckets[to].lock().push_front(&self.slots, index);
            }
            Some(from) if from == to => {}
            Some(from) => {
                let (mut from_list, mut to_list) = self.lock_pair(from, to);
                debug_assert!(from_list.contains(&self.slots, index));
                from_list.remove(&self.slots, index);
                to_list.push_front(&self.slots, index);
            }
        }

        if let Some(old) = previous {
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            log::debug!("bcache: slot {} evicted {} for {}", index, old, key);
        }
    }

    /// Locks two distinct buckets in ascending index order, returned as `(a, b)`
    fn lock_pair(
        &self,
        a: usize,
        b: usize,
    ) -> (
        SpinLockGuard<'_, BucketList>,
        SpinLockGuard<'_, BucketList>,
    ) {
        debug_assert_ne!(a, b);
        if a < b {
            let first = self.buckets[a].lock();
            let second = self.buckets[b].lock();
            (first, second)
        } else {
            let first = self.buckets[b].lock();
            let second = self.buckets[a].lock();
            (second, first)
        }
    }

    /// Drops one reference on `slot` under its bucket lock
    fn put(&self, slot: SlotRef, op: &str) {
        let _bucket = self.buckets[self.bucket_of(slot.key)].lock();
        let mut meta = self.slots[slot.index].meta.lock();

        if meta.key != Some(slot.key) || meta.epoch != slot.epoch {
            panic!(
                "{}: slot {} holds {:?}, not {}",
                op, slot.index, meta.key, slot.key
            );
        }
        if meta.refcnt == 0 {
            log::error!("bcache: {} of {} with no references", op, slot.key);
            panic!(
                "{}: reference count underflow on slot {} ({})",
                op, slot.index, slot.key
            );
        }
        meta.refcnt -= 1;
    }

    /// Releases a locked buffer; same as dropping it
    pub fn release(&self, buf: BufGuard<'_>) {
        drop(buf);
    }

    /// Keeps a slot resident without holding its data lock
    ///
    /// # Panics
    /// Panics if the slot is no longer bound to the block `slot` refers to.
    pub fn pin(&self, slot: SlotRef) {
        let _bucket = self.buckets[self.bucket_of(slot.key)].lock();
        let mut meta = self.slots[slot.index].meta.lock();

        if meta.key != Some(slot.key) || meta.epoch != slot.epoch || meta.refcnt == 0 {
            panic!(
                "pin: slot {} no longer holds {} (bound to {:?}, refcnt {})",
                slot.index, slot.key, meta.key, meta.refcnt
            );
        }
        meta.refcnt += 1;
    }

    /// Drops a reference taken by [`BlockCache::pin`]
    ///
    /// # Panics
    /// Panics if the slot has no references left to drop.
    pub fn unpin(&self, slot: SlotRef) {
        self.put(slot, "unpin");
    }

    /// Looks up `key` without taking a reference or refreshing its timestamp
    fn find(&self, key: BlockKey) -> Option<(usize, u32)> {
        let list = self.buckets[self.bucket_of(key)].lock();
        list.iter(&self.slots).find_map(|index| {
            let meta = self.slots[index].meta.lock();
            (meta.key == Some(key)).then_some((index, meta.refcnt))
        })
    }

    /// Returns true if `(dev, blockno)` is currently bound to a slot
    pub fn contains(&self, dev: u32, blockno: u32) -> bool {
        self.find(BlockKey::new(dev, blockno)).is_some()
    }

    /// Reference count of `(dev, blockno)`, or `None` if it is not cached
    pub fn ref_count(&self, dev: u32, blockno: u32) -> Option<u32> {
        self.find(BlockKey::new(dev, blockno))
            .map(|(_, refcnt)| refcnt)
    }

    /// Snapshot of every bound slot, in slot order
    pub fn bindings(&self) -> Vec<SlotInfo> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, s)| {
                let meta = s.meta.lock();
                meta.key.map(|key| SlotInfo {
                    slot,
                    key,
                    refcnt: meta.refcnt,
                    last_used: meta.last_used.unwrap_or(0),
                })
            })
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
        }
    }

    /// Verifies that every bound slot sits in its key's bucket and no key is bound twice
    #[cfg(test)]
    fn check_invariants(&self) {
        use std::collections::HashSet;

        let mut seen = HashSet::new();
        let mut members = 0;
        for (b, bucket) in self.buckets.iter().enumerate() {
            let list = bucket.lock();
            for index in list.iter(&self.slots) {
                let meta = self.slots[index].meta.lock();
                let key = meta.key.expect("unbound slot linked into a bucket");
                assert_eq!(self.bucket_of(key), b, "slot {} in wrong bucket", index);
                assert!(seen.insert(key), "{} bound twice", key);
                members += 1;
            }
            assert_eq!(list.len(), list.iter(&self.slots).count());
        }
        assert_eq!(members, self.bindings().len());
    }
}

/// Reference held on a slot; dropping it releases the reference
struct Hold<'a> {
    cache: &'a BlockCache,
    slot: SlotRef,
}

impl Drop for Hold<'_> {
    fn drop(&mut self) {
        self.cache.put(self.slot, "release");
    }
}

/// A buffer whose data lock is held by the caller.
///
/// Dropping the guard releases the data lock first and then the reference, in that
/// order (field order).
pub struct BufGuard<'a> {
    data: SleepLockGuard<'a, BufData>,
    hold: Hold<'a>,
}

impl<'a> BufGuard<'a> {
    pub fn key(&self) -> BlockKey {
        self.hold.slot.key
    }

    pub fn dev(&self) -> u32 {
        self.hold.slot.key.dev
    }

    pub fn blockno(&self) -> u32 {
        self.hold.slot.key.blockno
    }

    /// Reference usable with [`BlockCache::pin`] and [`BlockCache::unpin`]
    pub fn slot(&self) -> SlotRef {
        self.hold.slot
    }

    #[inline]
    fn binding(&self) -> (BlockKey, u64) {
        (self.hold.slot.key, self.hold.slot.epoch)
    }

    /// Returns true if the data reflects the block's on-disk contents
    pub fn is_valid(&self) -> bool {
        self.data.loaded == Some(self.binding())
    }

    /// Returns the block contents, reading them from disk first if not valid
    pub fn read(&mut self) -> DiskResult<&[u8]> {
        let binding = self.binding();
        if self.data.loaded != Some(binding) {
            self.hold
                .cache
                .disk
                .transfer(binding.0, &mut self.data.bytes[..], Direction::Read)?;
            self.data.loaded = Some(binding);
        }
        Ok(&self.data.bytes[..])
    }

    /// Writes the buffer's data to disk
    pub fn write(&mut self) -> DiskResult<()> {
        let binding = self.binding();
        self.hold
            .cache
            .disk
            .transfer(binding.0, &mut self.data.bytes[..], Direction::Write)?;
        self.data.loaded = Some(binding);
        Ok(())
    }

    pub fn data(&self) -> &[u8] {
        &self.data.bytes[..]
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data.bytes[..]
    }

    /// Releases the data lock and the reference
    pub fn release(self) {}
}
