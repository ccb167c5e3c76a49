//! Per-CPU adaptive sampling
//!
//! Each CPU keeps the timestamp of its last accepted sample. An event arriving
//! at least one window after that timestamp is always measured; an event
//! inside the window is measured with probability `1/R`. Every accepted event
//! restarts the window for its CPU.
//!
//! This bounds the guaranteed emission rate to about one event per window per
//! CPU while still letting a fraction of bursts through, with no state shared
//! between CPUs.

use crate::LatencyConfig;

/// Per-CPU storage for the last accepted sample timestamp
///
/// Each slot is written only by the CPU that owns it.
pub trait SampleClock {
    /// Timestamp of the last accepted sample on `cpu`, `None` before the first
    fn last_sample(&self, cpu: u32) -> Option<u64>;

    /// Record an accepted sample on `cpu` at `now`
    fn mark_sampled(&self, cpu: u32, now: u64);
}

/// Uniformly distributed 32-bit pseudo-random values
pub trait RandomSource {
    fn next_u32(&self) -> u32;
}

/// Decides whether a switch event is measured at all
pub trait Sampler {
    fn should_sample(&self, now: u64, cpu: u32) -> bool;
}

/// Time-window + probabilistic sampler over per-CPU state
pub struct ThrottleGate<C, R> {
    clock: C,
    rng: R,
    window_ns: u64,
    sample_ratio: u32,
}

impl<C: SampleClock, R: RandomSource> ThrottleGate<C, R> {
    pub fn new(config: &LatencyConfig, clock: C, rng: R) -> Self {
        Self { clock, rng, window_ns: config.window_ns, sample_ratio: config.sample_ratio }
    }

    /// Per-CPU sample timestamps
    pub fn clock(&self) -> &C {
        &self.clock
    }

    fn in_window_draw(&self) -> bool {
        self.sample_ratio <= 1 || self.rng.next_u32() % self.sample_ratio == 0
    }
}

impl<C: SampleClock, R: RandomSource> Sampler for ThrottleGate<C, R> {
    fn should_sample(&self, now: u64, cpu: u32) -> bool {
        let keep = match self.clock.last_sample(cpu) {
            None => true,
            Some(last) if now.saturating_sub(last) >= self.window_ns => true,
            Some(_) => self.in_window_draw(),
        };

        if keep {
            self.clock.mark_sampled(cpu, now);
        }
        keep
    }
}

impl<S: Sampler + ?Sized> Sampler for &S {
    fn should_sample(&self, now: u64, cpu: u32) -> bool {
        (**self).should_sample(now, cpu)
    }
}
