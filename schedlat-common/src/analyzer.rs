//! Wake-up → switch-in correlation
//!
//! [`SwitchAnalyzer`] runs once per wake-up and once per context switch, on
//! every CPU. Each call is a short, non-blocking computation; every "nothing to
//! report" case is a [`SwitchOutcome`], never an error.

use crate::group::GroupResolver;
use crate::throttle::Sampler;
use crate::wakeup::WakeupTable;
use crate::{LatencyConfig, LatencyEvent, IDLE_TID, TASK_COMM_LEN, TASK_RUNNING};

/// Identity of one side of a context switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    /// Process ID (TGID)
    pub pid: u32,
    /// Thread ID
    pub tid: u32,
    /// Thread name, NUL-padded
    pub comm: [u8; TASK_COMM_LEN],
}

/// A context switch as seen on one CPU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedSwitch {
    /// Task leaving the CPU
    pub prev: TaskInfo,
    /// Scheduler state of `prev` at switch-out (`TASK_RUNNING` = preempted)
    pub prev_state: i64,
    /// Task entering the CPU
    pub next: TaskInfo,
    /// CPU the switch happened on
    pub cpu: u32,
    /// Monotonic timestamp of the switch (nanoseconds)
    pub now_ns: u64,
}

/// What a switch event turned into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOutcome {
    /// One side of the switch was the idle task
    Idle,
    /// The incoming thread had no outstanding wake-up
    NoWakeup,
    /// The wake-up was consumed but the event was not sampled
    Throttled,
    /// Sampled, but the delay was under the reporting threshold
    BelowThreshold { delay_ns: u64 },
    /// A record was handed to the sink
    Emitted { delay_ns: u64, preempted: bool },
}

/// Best-effort output for latency records
///
/// Must never block. A full transport drops the record and accounts for it in
/// aggregate only.
pub trait EventSink {
    fn emit(&self, event: &LatencyEvent);
}

impl<E: EventSink + ?Sized> EventSink for &E {
    fn emit(&self, event: &LatencyEvent) {
        (**self).emit(event);
    }
}

/// Correlates wake-ups with switch-ins and emits the interesting delays
pub struct SwitchAnalyzer<W, S, G, E> {
    wakeups: W,
    sampler: S,
    groups: G,
    sink: E,
    threshold_ns: u64,
}

impl<W, S, G, E> SwitchAnalyzer<W, S, G, E>
where
    W: WakeupTable,
    S: Sampler,
    G: GroupResolver,
    E: EventSink,
{
    pub fn new(config: &LatencyConfig, wakeups: W, sampler: S, groups: G, sink: E) -> Self {
        Self { wakeups, sampler, groups, sink, threshold_ns: config.threshold_ns }
    }

    /// Handle `sched_wakeup` / `sched_wakeup_new`
    #[inline(always)]
    pub fn on_wakeup(&self, tid: u32, now_ns: u64) {
        self.wakeups.record_wakeup(tid, now_ns);
    }

    /// Handle `sched_switch`
    ///
    /// The wake-up entry is consumed before the sampling decision, so a
    /// throttled event is lost rather than re-measured later from a stale
    /// timestamp. The threshold is applied after sampling.
    #[inline(always)]
    pub fn on_switch(&self, switch: &SchedSwitch) -> SwitchOutcome {
        if switch.prev.tid == IDLE_TID || switch.next.tid == IDLE_TID {
            return SwitchOutcome::Idle;
        }

        let Some(wake_ts) = self.wakeups.take_wakeup(switch.next.tid) else {
            return SwitchOutcome::NoWakeup;
        };

        let delay_ns = switch.now_ns.saturating_sub(wake_ts);

        if !self.sampler.should_sample(switch.now_ns, switch.cpu) {
            return SwitchOutcome::Throttled;
        }

        if delay_ns < self.threshold_ns {
            return SwitchOutcome::BelowThreshold { delay_ns };
        }

        let prev_cgroup_id = self.groups.resolve_group_id(&switch.prev);
        let cgroup_id = self.groups.resolve_group_id(&switch.next);

        let preempted = switch.prev_state == TASK_RUNNING;
        let (preempted_pid, preempted_comm) =
            if preempted { (switch.prev.pid, switch.prev.comm) } else { (0, [0u8; TASK_COMM_LEN]) };

        let event = LatencyEvent {
            pid: switch.next.pid,
            tid: switch.next.tid,
            delay_ns,
            ts: switch.now_ns,
            cgroup_id,
            prev_cgroup_id,
            preempted_pid,
            is_preempt: u32::from(preempted),
            comm: switch.next.comm,
            preempted_comm,
        };
        self.sink.emit(&event);

        SwitchOutcome::Emitted { delay_ns, preempted }
    }

    pub fn wakeups(&self) -> &W {
        &self.wakeups
    }

    pub fn groups(&self) -> &G {
        &self.groups
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    pub fn threshold_ns(&self) -> u64 {
        self.threshold_ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm_from_bytes;
    use crate::throttle::tests::{Fixed, MapClock};
    use crate::throttle::ThrottleGate;
    use crate::wakeup::tests::MapTable;
    use crate::{TASK_INTERRUPTIBLE, TASK_UNINTERRUPTIBLE};
    use std::cell::RefCell;

    struct Always(bool);

    impl Sampler for Always {
        fn should_sample(&self, _now: u64, _cpu: u32) -> bool {
            self.0
        }
    }

    /// Group id = tid * 100
    struct TidGroups;

    impl GroupResolver for TidGroups {
        fn resolve_group_id(&self, task: &TaskInfo) -> u64 {
            u64::from(task.tid) * 100
        }
    }

    #[derive(Default)]
    struct Capture(RefCell<Vec<LatencyEvent>>);

    impl EventSink for Capture {
        fn emit(&self, event: &LatencyEvent) {
            self.0.borrow_mut().push(*event);
        }
    }

    fn task(pid: u32, tid: u32, name: &str) -> TaskInfo {
        TaskInfo { pid, tid, comm: comm_from_bytes(name.as_bytes()) }
    }

    fn switch(prev: TaskInfo, prev_state: i64, next: TaskInfo, now_ns: u64) -> SchedSwitch {
        SchedSwitch { prev, prev_state, next, cpu: 0, now_ns }
    }

    fn analyzer(keep: bool) -> SwitchAnalyzer<MapTable, Always, TidGroups, Capture> {
        SwitchAnalyzer::new(
            &LatencyConfig::default(),
            MapTable::default(),
            Always(keep),
            TidGroups,
            Capture::default(),
        )
    }

    #[test]
    fn test_blocked_prev_emits_without_preemption() {
        let a = analyzer(true);
        a.on_wakeup(42, 1_000_000);

        let outcome = a.on_switch(&switch(
            task(7, 7, "kworker"),
            TASK_INTERRUPTIBLE,
            task(40, 42, "worker"),
            3_000_000,
        ));
        assert_eq!(outcome, SwitchOutcome::Emitted { delay_ns: 2_000_000, preempted: false });

        let events = a.sink().0.borrow();
        assert_eq!(events.len(), 1);
        let ev = events[0];
        assert_eq!(ev.pid, 40);
        assert_eq!(ev.tid, 42);
        assert_eq!(ev.delay_ns, 2_000_000);
        assert_eq!(ev.ts, 3_000_000);
        assert_eq!(ev.is_preempt, 0);
        assert_eq!(ev.preempted_pid, 0);
        assert_eq!(ev.preempted_comm, [0u8; TASK_COMM_LEN]);
        assert_eq!(ev.comm_str(), "worker");
        assert_eq!(ev.cgroup_id, 4_200);
        assert_eq!(ev.prev_cgroup_id, 700);
    }

    #[test]
    fn test_sub_threshold_delay_not_emitted() {
        let a = analyzer(true);
        a.on_wakeup(42, 1_000_000);

        let outcome =
            a.on_switch(&switch(task(7, 7, "spin"), TASK_RUNNING, task(42, 42, "w"), 1_500_000));
        assert_eq!(outcome, SwitchOutcome::BelowThreshold { delay_ns: 500_000 });
        assert!(a.sink().0.borrow().is_empty());
    }

    #[test]
    fn test_no_prior_wakeup_not_emitted() {
        let a = analyzer(true);
        let outcome =
            a.on_switch(&switch(task(7, 7, "a"), TASK_RUNNING, task(99, 99, "b"), 9_000_000));
        assert_eq!(outcome, SwitchOutcome::NoWakeup);
        assert!(a.sink().0.borrow().is_empty());
    }

    #[test]
    fn test_runnable_prev_marks_preemption() {
        let a = analyzer(true);
        a.on_wakeup(5, 0);

        let outcome =
            a.on_switch(&switch(task(3, 3, "hog"), TASK_RUNNING, task(5, 5, "victim"), 2_000_000));
        assert_eq!(outcome, SwitchOutcome::Emitted { delay_ns: 2_000_000, preempted: true });

        let ev = a.sink().0.borrow()[0];
        assert!(ev.is_preemption());
        assert_eq!(ev.preempted_pid, 3);
        assert_eq!(ev.preempted_comm_str(), "hog");
    }

    #[test]
    fn test_uninterruptible_prev_is_not_preemption() {
        let a = analyzer(true);
        a.on_wakeup(5, 0);
        let outcome = a.on_switch(&switch(
            task(3, 3, "io"),
            TASK_UNINTERRUPTIBLE,
            task(5, 5, "w"),
            2_000_000,
        ));
        assert_eq!(outcome, SwitchOutcome::Emitted { delay_ns: 2_000_000, preempted: false });
    }

    #[test]
    fn test_idle_transitions_ignored_and_keep_wakeup() {
        let a = analyzer(true);
        a.on_wakeup(42, 0);

        let idle = task(0, IDLE_TID, "swapper/0");
        let outcome = a.on_switch(&switch(idle, TASK_RUNNING, task(42, 42, "w"), 5_000_000));
        assert_eq!(outcome, SwitchOutcome::Idle);
        assert_eq!(a.wakeups().0.borrow().get(&42), Some(&0));

        let outcome = a.on_switch(&switch(task(42, 42, "w"), TASK_RUNNING, idle, 5_000_000));
        assert_eq!(outcome, SwitchOutcome::Idle);
    }

    #[test]
    fn test_throttled_event_consumes_wakeup() {
        let a = analyzer(false);
        a.on_wakeup(42, 0);

        let sw = switch(task(7, 7, "a"), TASK_RUNNING, task(42, 42, "w"), 5_000_000);
        assert_eq!(a.on_switch(&sw), SwitchOutcome::Throttled);
        assert_eq!(a.on_switch(&sw), SwitchOutcome::NoWakeup);
        assert!(a.sink().0.borrow().is_empty());
    }

    #[test]
    fn test_threshold_boundary_is_inclusive() {
        let a = analyzer(true);
        a.on_wakeup(42, 0);
        let outcome = a.on_switch(&switch(
            task(7, 7, "a"),
            TASK_INTERRUPTIBLE,
            task(42, 42, "w"),
            a.threshold_ns(),
        ));
        assert!(matches!(outcome, SwitchOutcome::Emitted { .. }));
    }

    #[test]
    fn test_with_real_gate_first_switch_per_cpu_is_sampled() {
        let gate = ThrottleGate::new(&LatencyConfig::default(), MapClock::default(), Fixed(1));
        let a = SwitchAnalyzer::new(
            &LatencyConfig::default(),
            MapTable::default(),
            gate,
            TidGroups,
            Capture::default(),
        );

        a.on_wakeup(42, 1_000_000);
        a.on_wakeup(43, 1_000_000);
        let first =
            a.on_switch(&switch(task(7, 7, "a"), TASK_INTERRUPTIBLE, task(42, 42, "w"), 3_000_000));
        let second = a.on_switch(&switch(
            task(42, 42, "w"),
            TASK_INTERRUPTIBLE,
            task(43, 43, "x"),
            3_100_000,
        ));

        assert!(matches!(first, SwitchOutcome::Emitted { .. }));
        assert_eq!(second, SwitchOutcome::Throttled);
    }
}
