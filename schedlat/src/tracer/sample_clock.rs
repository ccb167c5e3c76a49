//! Per-CPU sampling state and random sources for the in-process tracer

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use schedlat_common::{RandomSource, SampleClock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// One last-sample slot per CPU, allocated once and never resized
///
/// Slots store `timestamp + 1` so that zero can mean "never sampled" while
/// updates stay monotonic with `fetch_max`. CPU ids past the end of the array
/// fold back onto it.
pub struct PerCpuSampleClock {
    slots: Box<[AtomicU64]>,
}

impl PerCpuSampleClock {
    #[must_use]
    pub fn new(cpus: usize) -> Self {
        let slots = (0..cpus.max(1)).map(|_| AtomicU64::new(0)).collect();
        Self { slots }
    }

    #[must_use]
    pub fn cpus(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, cpu: u32) -> &AtomicU64 {
        &self.slots[cpu as usize % self.slots.len()]
    }
}

impl SampleClock for PerCpuSampleClock {
    fn last_sample(&self, cpu: u32) -> Option<u64> {
        self.slot(cpu).load(Ordering::Relaxed).checked_sub(1)
    }

    fn mark_sampled(&self, cpu: u32, now: u64) {
        self.slot(cpu).fetch_max(now.saturating_add(1), Ordering::Relaxed);
    }
}

/// Draws from the calling thread's generator
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_u32(&self) -> u32 {
        rand::random()
    }
}

/// Reproducible draws from a fixed seed
pub struct SeededRandom(Mutex<StdRng>);

impl SeededRandom {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl RandomSource for SeededRandom {
    fn next_u32(&self) -> u32 {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).next_u32()
    }
}
