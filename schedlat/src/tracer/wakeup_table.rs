//! Sharded in-process wake-up table
//!
//! Each shard is a small `HashMap` behind its own `Mutex`, selected by thread
//! id, so operations on different threads rarely contend and operations on the
//! same thread are serialized (last writer wins, exactly one taker).

use schedlat_common::WakeupTable;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of shards used by [`ShardedWakeupTable::new`]
pub const DEFAULT_SHARDS: usize = 64;

/// Bounded tid → wake-up timestamp table
///
/// Capacity is split evenly across shards. Inserting a new thread into a full
/// shard evicts the shard's oldest wake-up.
pub struct ShardedWakeupTable {
    shards: Box<[Mutex<HashMap<u32, u64>>]>,
    shard_capacity: usize,
}

impl ShardedWakeupTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_shards(capacity, DEFAULT_SHARDS)
    }

    #[must_use]
    pub fn with_shards(capacity: usize, shards: usize) -> Self {
        let shards = shards.max(1);
        let shard_capacity = capacity.div_ceil(shards).max(1);
        let shards =
            (0..shards).map(|_| Mutex::new(HashMap::with_capacity(shard_capacity))).collect();
        Self { shards, shard_capacity }
    }

    /// Upper bound on stored entries
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shard_capacity * self.shards.len()
    }

    /// Number of outstanding wake-ups
    #[must_use]
    pub fn len(&self) -> usize {
        (0..self.shards.len()).map(|i| self.lock(i).len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn shard_for(&self, tid: u32) -> MutexGuard<'_, HashMap<u32, u64>> {
        self.lock(tid as usize % self.shards.len())
    }

    // A panic while holding a shard cannot leave the map half-updated, so a
    // poisoned lock is still usable.
    fn lock(&self, index: usize) -> MutexGuard<'_, HashMap<u32, u64>> {
        self.shards[index].lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WakeupTable for ShardedWakeupTable {
    fn insert(&self, tid: u32, ts: u64) {
        let mut shard = self.shard_for(tid);
        if shard.len() >= self.shard_capacity && !shard.contains_key(&tid) {
            let oldest = shard.iter().min_by_key(|&(_, woke)| *woke).map(|(&victim, _)| victim);
            if let Some(victim) = oldest {
                shard.remove(&victim);
            }
        }
        shard.insert(tid, ts);
    }

    fn remove(&self, tid: u32) -> Option<u64> {
        self.shard_for(tid).remove(&tid)
    }
}
