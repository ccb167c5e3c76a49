//! Thread → cgroup lookup for the in-process tracer
//!
//! Sharded by thread id like [`super::ShardedWakeupTable`]. Lookups and
//! unchanged assignments only take a shard's read lock.

use crate::domain::{CgroupId, Tid};
use schedlat_common::{GroupResolver, TaskInfo, TASK_META_CAPACITY};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Number of shards used by [`GroupTable::new`]
pub const DEFAULT_SHARDS: usize = 64;

/// Bounded group ids learned from observed events
///
/// Threads that were never assigned, or whose entry was evicted, resolve to 0.
pub struct GroupTable {
    shards: Box<[RwLock<HashMap<u32, u64>>]>,
    shard_capacity: usize,
}

impl Default for GroupTable {
    fn default() -> Self {
        Self::new(TASK_META_CAPACITY as usize)
    }
}

impl GroupTable {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self::with_shards(capacity, DEFAULT_SHARDS)
    }

    #[must_use]
    pub fn with_shards(capacity: usize, shards: usize) -> Self {
        let shards = shards.max(1);
        let shard_capacity = capacity.div_ceil(shards).max(1);
        let shards = (0..shards).map(|_| RwLock::new(HashMap::new())).collect();
        Self { shards, shard_capacity }
    }

    /// Record `tid`'s group; an unresolved id forgets the thread
    ///
    /// A new thread landing in a full shard evicts one of the shard's entries.
    pub fn assign(&self, tid: Tid, group: CgroupId) {
        let current = self.read(tid.0).get(&tid.0).copied();
        match current {
            Some(known) if group.is_resolved() && known == group.0 => return,
            None if !group.is_resolved() => return,
            _ => {}
        }

        let mut shard = self.write(tid.0);
        if !group.is_resolved() {
            shard.remove(&tid.0);
            return;
        }
        if shard.len() >= self.shard_capacity && !shard.contains_key(&tid.0) {
            let victim = shard.keys().next().copied();
            if let Some(victim) = victim {
                shard.remove(&victim);
            }
        }
        shard.insert(tid.0, group.0);
    }

    /// Upper bound on stored entries
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.shard_capacity * self.shards.len()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn index(&self, tid: u32) -> usize {
        tid as usize % self.shards.len()
    }

    fn read(&self, tid: u32) -> RwLockReadGuard<'_, HashMap<u32, u64>> {
        self.shards[self.index(tid)].read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, tid: u32) -> RwLockWriteGuard<'_, HashMap<u32, u64>> {
        self.shards[self.index(tid)].write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl GroupResolver for GroupTable {
    fn resolve_group_id(&self, task: &TaskInfo) -> u64 {
        self.read(task.tid).get(&task.tid).copied().unwrap_or(0)
    }
}
