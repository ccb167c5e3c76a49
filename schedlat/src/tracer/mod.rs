//! # In-Process Tracer
//!
//! Runs the shared scheduling-latency core outside the kernel, backed by
//! concurrent userspace structures:
//!
//! | Core trait     | Implementation          |
//! |----------------|-------------------------|
//! | `WakeupTable`  | [`ShardedWakeupTable`]  |
//! | `SampleClock`  | [`PerCpuSampleClock`]   |
//! | `RandomSource` | [`ThreadRandom`] / [`SeededRandom`] |
//! | `GroupResolver`| [`GroupTable`]          |
//! | `EventSink`    | [`ChannelEmitter`]      |
//!
//! [`Tracer`] is `Sync`: any number of threads may feed it events, standing in
//! for the CPUs that invoke the kernel programs.

pub mod emitter;
pub mod groups;
pub mod replay;
pub mod sample_clock;
pub mod wakeup_table;

pub use emitter::ChannelEmitter;
pub use groups::GroupTable;
pub use replay::{load_trace, read_trace, PrevState, SchedEvent, TaskRecord};
pub use sample_clock::{PerCpuSampleClock, SeededRandom, ThreadRandom};
pub use wakeup_table::ShardedWakeupTable;

use crossbeam_channel::Receiver;
use schedlat_common::{
    LatencyConfig, LatencyEvent, RandomSource, SchedSwitch, SwitchAnalyzer, SwitchOutcome,
    ThrottleGate, WAKEUP_TABLE_CAPACITY,
};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::domain::{CgroupId, Tid};
use crate::profiling::possible_cpu_count;

/// Most per-CPU sample slots a [`Tracer`] will size for
///
/// Matches the kernel's `NR_CPUS` ceiling; higher ids fold onto shared slots.
pub const MAX_CPUS: usize = 8192;

/// Sizing and tunables for a [`Tracer`]
#[derive(Debug, Clone, Copy)]
pub struct TracerOptions {
    pub config: LatencyConfig,
    /// Number of per-CPU sample slots; higher CPU ids share slots
    pub cpus: usize,
    /// Maximum outstanding wake-ups
    pub wakeup_capacity: usize,
    /// Bound of the output channel
    pub channel_capacity: usize,
}

impl TracerOptions {
    /// Size the per-CPU slots to cover `highest_cpu`, up to [`MAX_CPUS`]
    #[must_use]
    pub fn covering_cpu(self, highest_cpu: u32) -> Self {
        let needed = (highest_cpu as usize).saturating_add(1);
        Self { cpus: self.cpus.max(needed).min(MAX_CPUS), ..self }
    }
}

impl Default for TracerOptions {
    fn default() -> Self {
        Self {
            config: LatencyConfig::default(),
            cpus: possible_cpu_count(),
            wakeup_capacity: WAKEUP_TABLE_CAPACITY as usize,
            channel_capacity: 4096,
        }
    }
}

/// Outcome counters
#[derive(Default)]
struct TracerStats {
    wakeups: AtomicU64,
    switches: AtomicU64,
    idle: AtomicU64,
    no_wakeup: AtomicU64,
    throttled: AtomicU64,
    below_threshold: AtomicU64,
    emitted: AtomicU64,
    preempted: AtomicU64,
}

impl TracerStats {
    fn record(&self, outcome: SwitchOutcome) {
        self.switches.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            SwitchOutcome::Idle => &self.idle,
            SwitchOutcome::NoWakeup => &self.no_wakeup,
            SwitchOutcome::Throttled => &self.throttled,
            SwitchOutcome::BelowThreshold { .. } => &self.below_threshold,
            SwitchOutcome::Emitted { preempted, .. } => {
                if preempted {
                    self.preempted.fetch_add(1, Ordering::Relaxed);
                }
                &self.emitted
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of a tracer's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TracerCounts {
    pub wakeups: u64,
    pub switches: u64,
    pub idle: u64,
    pub no_wakeup: u64,
    pub throttled: u64,
    pub below_threshold: u64,
    /// Records accepted by the analyzer (includes channel drops)
    pub emitted: u64,
    pub preempted: u64,
    /// Records the channel took
    pub delivered: u64,
    /// Records the channel could not take
    pub dropped: u64,
}

type InProcessAnalyzer<R> = SwitchAnalyzer<
    ShardedWakeupTable,
    ThrottleGate<PerCpuSampleClock, R>,
    GroupTable,
    ChannelEmitter,
>;

/// Scheduling-latency core wired to in-process collaborators
pub struct Tracer<R = ThreadRandom> {
    analyzer: InProcessAnalyzer<R>,
    stats: TracerStats,
}

impl Tracer<ThreadRandom> {
    /// Build a tracer and the receiving end of its output channel
    #[must_use]
    pub fn new(options: TracerOptions) -> (Self, Receiver<LatencyEvent>) {
        Self::with_random(options, ThreadRandom)
    }
}

impl<R: RandomSource> Tracer<R> {
    /// Build a tracer drawing in-window samples from `rng`
    #[must_use]
    pub fn with_random(options: TracerOptions, rng: R) -> (Self, Receiver<LatencyEvent>) {
        let config = options.config;
        let (emitter, rx) = ChannelEmitter::bounded(options.channel_capacity);
        let analyzer = SwitchAnalyzer::new(
            &config,
            ShardedWakeupTable::new(options.wakeup_capacity),
            ThrottleGate::new(&config, PerCpuSampleClock::new(options.cpus), rng),
            GroupTable::default(),
            emitter,
        );
        let tracer = Self { analyzer, stats: TracerStats::default() };
        (tracer, rx)
    }

    /// Feed one scheduler event
    ///
    /// Returns the switch outcome for switch events, `None` for wake-ups.
    pub fn handle(&self, event: &SchedEvent) -> Option<SwitchOutcome> {
        match event {
            SchedEvent::Wakeup { tid, ts, .. } => {
                self.analyzer.on_wakeup(*tid, *ts);
                self.stats.wakeups.fetch_add(1, Ordering::Relaxed);
                None
            }
            SchedEvent::Switch { ts, cpu, prev, prev_state, next } => {
                self.learn_group(prev);
                self.learn_group(next);

                let switch = SchedSwitch {
                    prev: prev.to_task_info(),
                    prev_state: prev_state.raw(),
                    next: next.to_task_info(),
                    cpu: *cpu,
                    now_ns: *ts,
                };
                let outcome = self.analyzer.on_switch(&switch);
                self.stats.record(outcome);
                Some(outcome)
            }
        }
    }

    fn learn_group(&self, task: &TaskRecord) {
        let group = CgroupId(task.cgroup_id);
        if group.is_resolved() {
            self.analyzer.groups().assign(Tid(task.tid), group);
        }
    }

    /// Current counters
    #[must_use]
    pub fn counts(&self) -> TracerCounts {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        TracerCounts {
            wakeups: load(&self.stats.wakeups),
            switches: load(&self.stats.switches),
            idle: load(&self.stats.idle),
            no_wakeup: load(&self.stats.no_wakeup),
            throttled: load(&self.stats.throttled),
            below_threshold: load(&self.stats.below_threshold),
            emitted: load(&self.stats.emitted),
            preempted: load(&self.stats.preempted),
            delivered: self.analyzer.sink().emitted(),
            dropped: self.analyzer.sink().dropped(),
        }
    }

    /// Wake-ups recorded but not yet consumed by a switch
    #[must_use]
    pub fn pending_wakeups(&self) -> usize {
        self.analyzer.wakeups().len()
    }

    /// Threads with a known group id
    #[must_use]
    pub fn known_groups(&self) -> usize {
        self.analyzer.groups().len()
    }
}
