//! Bounded channel transport for latency records

use crossbeam_channel::{bounded, Receiver, Sender};
use schedlat_common::{EventSink, LatencyEvent};
use std::sync::atomic::{AtomicU64, Ordering};

/// Pushes records into a bounded channel without ever blocking
///
/// A full or disconnected channel drops the record; drops are only visible as
/// the aggregate [`ChannelEmitter::dropped`] count.
pub struct ChannelEmitter {
    tx: Sender<LatencyEvent>,
    emitted: AtomicU64,
    dropped: AtomicU64,
}

impl ChannelEmitter {
    #[must_use]
    pub fn bounded(capacity: usize) -> (Self, Receiver<LatencyEvent>) {
        let (tx, rx) = bounded(capacity);
        let emitter = Self { tx, emitted: AtomicU64::new(0), dropped: AtomicU64::new(0) };
        (emitter, rx)
    }

    #[must_use]
    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl EventSink for ChannelEmitter {
    fn emit(&self, event: &LatencyEvent) {
        let counter = match self.tx.try_send(*event) {
            Ok(()) => &self.emitted,
            Err(_) => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}
