//! # Shared Data Structures and Scheduling-Latency Core (eBPF ↔ Userspace)
//!
//! Everything in this crate compiles for both `bpfel-unknown-none` (kernel side)
//! and the host (userspace side). Record types use `#[repr(C)]` so their layout
//! is identical on both sides of the ring buffer.
//!
//! ## Core pipeline
//!
//! ```text
//!  sched_wakeup ──▶ WakeupTable::record_wakeup
//!
//!  sched_switch ──▶ SwitchAnalyzer::on_switch
//!                     1. idle filter
//!                     2. WakeupTable::take_wakeup
//!                     3. delay = now - wake_ts
//!                     4. ThrottleGate::should_sample
//!                     5. threshold filter
//!                     6. GroupResolver (prev + next)
//!                     7. preemption classification
//!                     8. EventSink::emit(LatencyEvent)
//! ```
//!
//! The storage behind each step is a trait so the kernel programs can back it
//! with eBPF maps while userspace backs it with concurrent in-process
//! structures (and tests back it with fixed stubs).
//!
//! ## Key Types
//!
//! - [`LatencyEvent`] - Record pushed to the transport for every reported delay
//! - [`LatencyConfig`] - Throttle window, sampling denominator, threshold
//! - [`SchedSwitchArgs`] / [`SchedWakeupArgs`] - Tracepoint argument layouts
//! - [`TaskMeta`] - Per-thread identity cached by the kernel side

#![cfg_attr(not(test), no_std)]

pub mod analyzer;
pub mod group;
pub mod throttle;
pub mod wakeup;

pub use analyzer::{EventSink, SchedSwitch, SwitchAnalyzer, SwitchOutcome, TaskInfo};
pub use group::{GroupResolver, NoGroups};
pub use throttle::{RandomSource, SampleClock, Sampler, ThrottleGate};
pub use wakeup::WakeupTable;

// ============================================================================
// Constants
// ============================================================================

/// Thread id the kernel uses for the per-CPU idle task (swapper)
///
/// Transitions into or out of the idle task are never measured.
pub const IDLE_TID: u32 = 0;

/// Length of a kernel task name including the trailing NUL
pub const TASK_COMM_LEN: usize = 16;

/// `prev_state` value reported by `sched_switch` for a task that was still
/// runnable when it was switched out (i.e. it was preempted)
pub const TASK_RUNNING: i64 = 0;

/// `prev_state` for a task sleeping in an interruptible wait
pub const TASK_INTERRUPTIBLE: i64 = 1;

/// `prev_state` for a task blocked in an uninterruptible wait (usually I/O)
pub const TASK_UNINTERRUPTIBLE: i64 = 2;

/// Default throttle window: one guaranteed sample per CPU per millisecond
pub const DEFAULT_WINDOW_NS: u64 = 1_000_000;

/// Default sampling denominator: 1 in 100 in-window events is measured
pub const DEFAULT_SAMPLE_RATIO: u32 = 100;

/// Default reporting threshold: delays under 1ms are not reported
pub const DEFAULT_THRESHOLD_NS: u64 = 1_000_000;

/// Maximum number of outstanding wake-ups tracked at once
pub const WAKEUP_TABLE_CAPACITY: u32 = 10240;

/// Maximum number of threads whose identity is cached by the kernel side
pub const TASK_META_CAPACITY: u32 = 16384;

/// Size of the kernel → userspace ring buffer
pub const EVENTS_RING_BYTES: u32 = 256 * 1024;

// ============================================================================
// Configuration map keys
// ============================================================================

/// `CONFIG[0]`: throttle window in nanoseconds
pub const CONFIG_WINDOW_NS: u32 = 0;

/// `CONFIG[1]`: sampling denominator
pub const CONFIG_SAMPLE_RATIO: u32 = 1;

/// `CONFIG[2]`: reporting threshold in nanoseconds
pub const CONFIG_THRESHOLD_NS: u32 = 2;

/// Tunables for throttling and filtering
///
/// Fixed for the lifetime of a tracing session: userspace writes them once
/// before the programs are attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyConfig {
    /// Time after the last accepted sample on a CPU during which events are
    /// only sampled probabilistically
    pub window_ns: u64,

    /// Denominator `R` of the in-window sampling probability `1/R`
    ///
    /// `0` and `1` both mean "sample every event".
    pub sample_ratio: u32,

    /// Minimum delay that is reported
    pub threshold_ns: u64,
}

impl LatencyConfig {
    /// Build a config from raw `CONFIG` map values, where `0` selects the default
    #[must_use]
    pub fn from_raw(window_ns: u64, sample_ratio: u64, threshold_ns: u64) -> Self {
        let defaults = Self::default();
        Self {
            window_ns: if window_ns == 0 { defaults.window_ns } else { window_ns },
            sample_ratio: match sample_ratio {
                0 => defaults.sample_ratio,
                r => u32::try_from(r).unwrap_or(u32::MAX),
            },
            threshold_ns: if threshold_ns == 0 { defaults.threshold_ns } else { threshold_ns },
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            window_ns: DEFAULT_WINDOW_NS,
            sample_ratio: DEFAULT_SAMPLE_RATIO,
            threshold_ns: DEFAULT_THRESHOLD_NS,
        }
    }
}

// ============================================================================
// Shared Data Structures
// ============================================================================

/// Scheduling latency record sent from eBPF to userspace via ring buffer
///
/// **Memory Layout**: `#[repr(C)]` with fields ordered so there is no implicit
/// padding; the in-memory layout is the packed wire layout (80 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencyEvent {
    /// Process ID (TGID) of the thread that was switched in
    pub pid: u32,

    /// Thread ID of the thread that was switched in
    pub tid: u32,

    /// Time between the thread's wake-up and its switch-in (nanoseconds)
    ///
    /// Always at least the configured threshold.
    pub delay_ns: u64,

    /// Monotonic timestamp of the switch-in (`bpf_ktime_get_ns()` domain)
    pub ts: u64,

    /// Group (cgroup v2) id of the thread that was switched in, 0 if unresolved
    pub cgroup_id: u64,

    /// Group (cgroup v2) id of the thread that was switched out, 0 if unresolved
    pub prev_cgroup_id: u64,

    /// Process ID of the preempted (switched-out) task
    ///
    /// Only meaningful when `is_preempt == 1`, zero otherwise.
    pub preempted_pid: u32,

    /// Whether the switched-out task was still runnable (1) or had blocked (0)
    pub is_preempt: u32,

    /// Name of the switched-in thread (NUL-padded)
    pub comm: [u8; TASK_COMM_LEN],

    /// Name of the preempted thread (NUL-padded, zeroed if not a preemption)
    pub preempted_comm: [u8; TASK_COMM_LEN],
}

const _: () = assert!(core::mem::size_of::<LatencyEvent>() == 80);

impl LatencyEvent {
    /// Whether this delay was caused by preempting a runnable task
    #[must_use]
    pub fn is_preemption(&self) -> bool {
        self.is_preempt != 0
    }

    /// Thread name of the switched-in thread
    #[must_use]
    pub fn comm_str(&self) -> &str {
        comm_as_str(&self.comm)
    }

    /// Thread name of the preempted thread (empty if not a preemption)
    #[must_use]
    pub fn preempted_comm_str(&self) -> &str {
        comm_as_str(&self.preempted_comm)
    }
}

/// Identity of a thread, cached by the kernel side at switch-out
///
/// The `sched_switch` tracepoint only carries the incoming thread's tid, so its
/// process id and group id are looked up from the last time it ran.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskMeta {
    /// Process ID (TGID)
    pub tgid: u32,

    /// Padding for 8-byte alignment
    #[allow(clippy::pub_underscore_fields)]
    pub _padding: u32,

    /// Group (cgroup v2) id
    pub cgroup_id: u64,
}

/// Tracepoint arguments for `sched/sched_switch`
///
/// Layout defined by the Linux kernel tracepoint ABI:
/// `/sys/kernel/debug/tracing/events/sched/sched_switch/format`
///
/// - **prev_***: The thread being switched OUT (going off-CPU)
/// - **next_***: The thread being switched IN (going on-CPU)
#[repr(C)]
pub struct SchedSwitchArgs {
    /// Kernel tracepoint common fields
    #[allow(clippy::pub_underscore_fields)]
    pub __unused__: u64,

    pub prev_comm: [u8; TASK_COMM_LEN],
    pub prev_pid: i32,
    pub prev_prio: i32,

    /// State of the thread being switched out
    ///
    /// `0` (`TASK_RUNNING`) means the thread was preempted while runnable.
    pub prev_state: i64,

    pub next_comm: [u8; TASK_COMM_LEN],
    pub next_pid: i32,
    pub next_prio: i32,
}

/// Tracepoint arguments for `sched/sched_wakeup` and `sched/sched_wakeup_new`
///
/// Layout from `/sys/kernel/debug/tracing/events/sched/sched_wakeup/format`.
#[repr(C)]
pub struct SchedWakeupArgs {
    /// Kernel tracepoint common fields
    #[allow(clippy::pub_underscore_fields)]
    pub __unused__: u64,

    pub comm: [u8; TASK_COMM_LEN],

    /// Thread ID of the woken thread
    pub pid: i32,
    pub prio: i32,
    pub target_cpu: i32,
}

// ============================================================================
// Task name helpers
// ============================================================================

/// Copy a task name into a fixed-width field
///
/// Truncates to `TASK_COMM_LEN - 1` bytes so the result is always
/// NUL-terminated, and stops at the first NUL in `name`.
#[must_use]
pub fn comm_from_bytes(name: &[u8]) -> [u8; TASK_COMM_LEN] {
    let mut comm = [0u8; TASK_COMM_LEN];
    let len = name
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(name.len())
        .min(TASK_COMM_LEN - 1);
    comm[..len].copy_from_slice(&name[..len]);
    comm
}

/// View a NUL-padded task name as a string
///
/// Returns `"<invalid>"` if the bytes before the first NUL are not UTF-8.
#[must_use]
pub fn comm_as_str(comm: &[u8]) -> &str {
    let len = comm.iter().position(|&b| b == 0).unwrap_or(comm.len());
    core::str::from_utf8(&comm[..len]).unwrap_or("<invalid>")
}

#[cfg(feature = "user")]
use aya::Pod;

// Pod marks the types as plain bytes for aya map and ring buffer access
#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for LatencyEvent {}

#[cfg(feature = "user")]
#[allow(unsafe_code)]
unsafe impl Pod for TaskMeta {}
