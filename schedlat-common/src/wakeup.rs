//! Wake-up timestamp storage
//!
//! Maps a thread id to the monotonic timestamp at which it last became
//! runnable. Implementations must make `insert` and `remove` atomic per key:
//! two wake-ups racing for one tid leave exactly one value (last writer wins),
//! and a wake-up racing with a switch-in is taken by at most one caller.
//!
//! Capacity is bounded by the implementation. A full table may evict any
//! existing entry or reject the insert, but must never block.

use crate::IDLE_TID;

/// Bounded tid → wake-up timestamp table
pub trait WakeupTable {
    /// Store `ts` for `tid`, replacing any previous value
    fn insert(&self, tid: u32, ts: u64);

    /// Remove and return the value stored for `tid`
    fn remove(&self, tid: u32) -> Option<u64>;

    /// Record that `tid` became runnable at `ts`
    ///
    /// The idle thread is ignored. A thread woken twice before it runs is only
    /// charged for the most recent wake-up.
    fn record_wakeup(&self, tid: u32, ts: u64) {
        if tid == IDLE_TID {
            return;
        }
        self.insert(tid, ts);
    }

    /// Consume the wake-up timestamp for `tid`
    ///
    /// `None` means the thread has no outstanding wake-up (it never blocked, or
    /// its entry was evicted), so there is no latency to attribute.
    fn take_wakeup(&self, tid: u32) -> Option<u64> {
        if tid == IDLE_TID {
            return None;
        }
        self.remove(tid)
    }
}

impl<T: WakeupTable + ?Sized> WakeupTable for &T {
    fn insert(&self, tid: u32, ts: u64) {
        (**self).insert(tid, ts);
    }

    fn remove(&self, tid: u32) -> Option<u64> {
        (**self).remove(tid)
    }
}
