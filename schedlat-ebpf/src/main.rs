//! # eBPF Kernel-Side Scheduling Latency Probes
//!
//! Runs the shared [`SwitchAnalyzer`] inside the kernel, with every collaborator
//! backed by an eBPF map.
//!
//! ## Programs
//!
//! - **Tracepoint**: `sched_wakeup` / `sched_wakeup_new` - record wake-up time
//! - **Tracepoint**: `sched_switch` - correlate, throttle, filter, emit
//!
//! ## Maps (Shared with Userspace)
//!
//! - `EVENTS` - Ring buffer carrying `LatencyEvent` records
//! - `WAKEUP_TIMES` - Thread ID → wake-up timestamp
//! - `LAST_SAMPLE` - Per-CPU timestamp of the last accepted sample
//! - `TASK_META` - Thread ID → process ID + cgroup id, learned at switch-out
//! - `CONFIG` - Window, sampling ratio, threshold (written once by userspace)
//! - `EMITTED_EVENTS` / `DROPPED_EVENTS` - Per-CPU ring buffer push counters
//!
//! ## Build
//!
//! ```bash
//! cargo xtask build-ebpf
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::{
        bpf_get_current_cgroup_id, bpf_get_current_pid_tgid, bpf_get_prandom_u32,
        bpf_get_smp_processor_id, bpf_ktime_get_ns,
    },
    macros::{map, tracepoint},
    maps::{HashMap, LruHashMap, PerCpuArray, RingBuf},
    programs::TracePointContext,
    EbpfContext,
};
use aya_log_ebpf::debug;
use schedlat_common::{
    EventSink, GroupResolver, LatencyConfig, LatencyEvent, RandomSource, SampleClock,
    SchedSwitch, SchedSwitchArgs, SchedWakeupArgs, SwitchAnalyzer, SwitchOutcome, TaskInfo,
    TaskMeta, ThrottleGate, WakeupTable, CONFIG_SAMPLE_RATIO, CONFIG_THRESHOLD_NS,
    CONFIG_WINDOW_NS, EVENTS_RING_BYTES, IDLE_TID, TASK_META_CAPACITY, WAKEUP_TABLE_CAPACITY,
};

// ============================================================================
// eBPF Maps - Shared data structures between kernel and userspace
// ============================================================================

/// Ring buffer for sending latency records to userspace
///
/// A full buffer makes `output()` fail; the record is dropped and counted in
/// `DROPPED_EVENTS`.
#[map]
static EVENTS: RingBuf = RingBuf::with_byte_size(EVENTS_RING_BYTES, 0);

/// Map: Thread ID → wake-up timestamp (ns)
///
/// Inserts for new keys fail once the map is full; that thread simply has no
/// latency reported for this wake-up.
#[map]
static WAKEUP_TIMES: HashMap<u32, u64> = HashMap::with_max_entries(WAKEUP_TABLE_CAPACITY, 0);

/// Per-CPU timestamp of the last accepted sample
///
/// The map type gives each CPU its own slot, so no cross-CPU synchronization.
#[map]
static LAST_SAMPLE: PerCpuArray<u64> = PerCpuArray::with_max_entries(1, 0);

/// Map: Thread ID → process ID + cgroup id
///
/// `sched_switch` runs in the context of the outgoing task, so its identity is
/// cached here and read back when it is the incoming task of a later switch.
#[map]
static TASK_META: LruHashMap<u32, TaskMeta> = LruHashMap::with_max_entries(TASK_META_CAPACITY, 0);

/// Map: Config key → Config value
///
/// - **Key 0**: Throttle window in nanoseconds (default: 1ms)
/// - **Key 1**: Sampling denominator (default: 100)
/// - **Key 2**: Reporting threshold in nanoseconds (default: 1ms)
#[map]
static CONFIG: HashMap<u32, u64> = HashMap::with_max_entries(16, 0);

/// Records successfully pushed to `EVENTS`
#[map]
static EMITTED_EVENTS: PerCpuArray<u64> = PerCpuArray::with_max_entries(1, 0);

/// Records dropped because `EVENTS` was full
#[map]
static DROPPED_EVENTS: PerCpuArray<u64> = PerCpuArray::with_max_entries(1, 0);

// ============================================================================
// Core collaborators backed by maps
// ============================================================================

struct MapWakeups;

impl WakeupTable for MapWakeups {
    fn insert(&self, tid: u32, ts: u64) {
        let _ = unsafe { WAKEUP_TIMES.insert(&tid, &ts, 0) };
    }

    // A thread being switched in is already running, so no wake-up can land
    // between the lookup and the delete.
    fn remove(&self, tid: u32) -> Option<u64> {
        let ts = unsafe { WAKEUP_TIMES.get(&tid).copied() }?;
        let _ = unsafe { WAKEUP_TIMES.remove(&tid) };
        Some(ts)
    }
}

/// Per-CPU map slot; the `cpu` argument is implied by the map type
struct PerCpuClock;

impl SampleClock for PerCpuClock {
    // Zero-initialized slot: never sampled
    fn last_sample(&self, _cpu: u32) -> Option<u64> {
        unsafe { LAST_SAMPLE.get_ptr(0).map(|ts| *ts) }.filter(|&ts| ts != 0)
    }

    fn mark_sampled(&self, _cpu: u32, now: u64) {
        if let Some(ts) = unsafe { LAST_SAMPLE.get_ptr_mut(0) } {
            unsafe { *ts = now };
        }
    }
}

struct Prandom;

impl RandomSource for Prandom {
    fn next_u32(&self) -> u32 {
        unsafe { bpf_get_prandom_u32() }
    }
}

/// Resolves the current (outgoing) task directly, anyone else through `TASK_META`
struct TaskGroups {
    current_tid: u32,
    current_cgroup_id: u64,
}

impl GroupResolver for TaskGroups {
    fn resolve_group_id(&self, task: &TaskInfo) -> u64 {
        if task.tid == self.current_tid {
            return self.current_cgroup_id;
        }
        unsafe { TASK_META.get(&task.tid).map_or(0, |meta| meta.cgroup_id) }
    }
}

struct RingSink;

impl EventSink for RingSink {
    fn emit(&self, event: &LatencyEvent) {
        match unsafe { EVENTS.output(event, 0) } {
            Ok(()) => bump(&EMITTED_EVENTS),
            Err(_) => bump(&DROPPED_EVENTS),
        }
    }
}

fn bump(counter: &PerCpuArray<u64>) {
    if let Some(count) = unsafe { counter.get_ptr_mut(0) } {
        unsafe { *count += 1 };
    }
}

fn load_config() -> LatencyConfig {
    let get = |key: u32| unsafe { CONFIG.get(&key).copied().unwrap_or(0) };
    LatencyConfig::from_raw(
        get(CONFIG_WINDOW_NS),
        get(CONFIG_SAMPLE_RATIO),
        get(CONFIG_THRESHOLD_NS),
    )
}

// ============================================================================
// eBPF Program Hooks
// ============================================================================

/// Hook: `sched/sched_wakeup`
#[tracepoint]
pub fn sched_wakeup(ctx: TracePointContext) -> u32 {
    record_wakeup(&ctx);
    0
}

/// Hook: `sched/sched_wakeup_new` - first wake-up of a newly created thread
#[tracepoint]
pub fn sched_wakeup_new(ctx: TracePointContext) -> u32 {
    record_wakeup(&ctx);
    0
}

fn record_wakeup(ctx: &TracePointContext) {
    let args: *const SchedWakeupArgs = ctx.as_ptr() as *const SchedWakeupArgs;
    let tid = unsafe { (*args).pid as u32 };
    let now = unsafe { bpf_ktime_get_ns() };

    MapWakeups.record_wakeup(tid, now);
}

/// Hook: `sched/sched_switch`
#[tracepoint]
pub fn sched_switch(ctx: TracePointContext) -> u32 {
    handle_sched_switch(&ctx);
    0
}

fn handle_sched_switch(ctx: &TracePointContext) {
    // Layout from /sys/kernel/debug/tracing/events/sched/sched_switch/format
    let args: *const SchedSwitchArgs = ctx.as_ptr() as *const SchedSwitchArgs;
    let prev_tid = unsafe { (*args).prev_pid as u32 };
    let prev_state = unsafe { (*args).prev_state };
    let prev_comm = unsafe { (*args).prev_comm };
    let next_tid = unsafe { (*args).next_pid as u32 };
    let next_comm = unsafe { (*args).next_comm };

    let now = unsafe { bpf_ktime_get_ns() };
    let cpu = unsafe { bpf_get_smp_processor_id() };

    // The outgoing task is still `current` here.
    let prev_tgid = unsafe { (bpf_get_current_pid_tgid() >> 32) as u32 };
    let prev_cgroup_id = unsafe { bpf_get_current_cgroup_id() };

    if prev_tid != IDLE_TID {
        let meta = TaskMeta { tgid: prev_tgid, _padding: 0, cgroup_id: prev_cgroup_id };
        let _ = unsafe { TASK_META.insert(&prev_tid, &meta, 0) };
    }

    let next_tgid = unsafe { TASK_META.get(&next_tid).map_or(next_tid, |meta| meta.tgid) };

    let switch = SchedSwitch {
        prev: TaskInfo { pid: prev_tgid, tid: prev_tid, comm: prev_comm },
        prev_state,
        next: TaskInfo { pid: next_tgid, tid: next_tid, comm: next_comm },
        cpu,
        now_ns: now,
    };

    let config = load_config();
    let analyzer = SwitchAnalyzer::new(
        &config,
        MapWakeups,
        ThrottleGate::new(&config, PerCpuClock, Prandom),
        TaskGroups { current_tid: prev_tid, current_cgroup_id: prev_cgroup_id },
        RingSink,
    );

    if let SwitchOutcome::Emitted { delay_ns, preempted } = analyzer.on_switch(&switch) {
        debug!(
            ctx,
            "latency tid={} delay={}ns cpu={} preempt={}",
            next_tid,
            delay_ns,
            cpu,
            u8::from(preempted)
        );
    }
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
