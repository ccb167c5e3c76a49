//! End-to-end wake-up → switch scenarios through the in-process tracer

use schedlat::tracer::{PrevState, SchedEvent, TaskRecord, Tracer, TracerOptions};
use schedlat_common::{LatencyConfig, RandomSource, SwitchOutcome};
use std::thread;

fn every_event() -> TracerOptions {
    TracerOptions {
        config: LatencyConfig { sample_ratio: 1, ..LatencyConfig::default() },
        cpus: 8,
        ..TracerOptions::default()
    }
}

fn task(pid: u32, tid: u32, comm: &str) -> TaskRecord {
    TaskRecord { pid, tid, comm: comm.to_string(), cgroup_id: 0 }
}

fn wakeup(tid: u32, ts: u64) -> SchedEvent {
    SchedEvent::Wakeup { tid, pid: 0, ts }
}

fn switch(
    ts: u64,
    cpu: u32,
    prev: TaskRecord,
    prev_state: PrevState,
    next: TaskRecord,
) -> SchedEvent {
    SchedEvent::Switch { ts, cpu, prev, prev_state, next }
}

/// Never lands on a multiple of any ratio above 1
struct NeverZero;

impl RandomSource for NeverZero {
    fn next_u32(&self) -> u32 {
        1
    }
}

#[test]
fn test_blocked_predecessor_reports_delay() {
    let (tracer, rx) = Tracer::new(every_event());

    tracer.handle(&wakeup(42, 1_000_000));
    let outcome = tracer.handle(&switch(
        3_000_000,
        0,
        task(7, 7, "kworker"),
        PrevState::Interruptible,
        task(40, 42, "worker"),
    ));

    assert_eq!(outcome, Some(SwitchOutcome::Emitted { delay_ns: 2_000_000, preempted: false }));
    let event = rx.try_recv().unwrap();
    assert_eq!((event.pid, event.tid, event.delay_ns, event.ts), (40, 42, 2_000_000, 3_000_000));
    assert_eq!(event.is_preempt, 0);
    assert_eq!(event.preempted_pid, 0);
    assert_eq!(event.comm_str(), "worker");
    assert_eq!(event.cgroup_id, 0);
    assert_eq!(event.prev_cgroup_id, 0);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_sub_threshold_delay_is_silent() {
    let (tracer, rx) = Tracer::new(every_event());

    tracer.handle(&wakeup(42, 1_000_000));
    let outcome = tracer.handle(&switch(
        1_500_000,
        0,
        task(7, 7, "spin"),
        PrevState::Running,
        task(42, 42, "worker"),
    ));

    assert_eq!(outcome, Some(SwitchOutcome::BelowThreshold { delay_ns: 500_000 }));
    assert!(rx.try_recv().is_err());
    assert_eq!(tracer.pending_wakeups(), 0);
}

#[test]
fn test_switch_without_wakeup_is_silent() {
    let (tracer, rx) = Tracer::new(every_event());

    let outcome = tracer.handle(&switch(
        9_000_000,
        0,
        task(7, 7, "a"),
        PrevState::Running,
        task(99, 99, "b"),
    ));

    assert_eq!(outcome, Some(SwitchOutcome::NoWakeup));
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_runnable_predecessor_is_a_preemption() {
    let (tracer, rx) = Tracer::new(every_event());

    tracer.handle(&wakeup(5, 0));
    let victim = task(5, 5, "victim");
    tracer.handle(&switch(2_000_000, 1, task(3, 3, "hog"), PrevState::Running, victim));

    let event = rx.try_recv().unwrap();
    assert!(event.is_preemption());
    assert_eq!(event.preempted_pid, 3);
    assert_eq!(event.preempted_comm_str(), "hog");
    assert_eq!(tracer.counts().preempted, 1);
}

#[test]
fn test_idle_switches_leave_wakeup_pending() {
    let (tracer, rx) = Tracer::new(every_event());

    tracer.handle(&wakeup(42, 0));
    let outcome = tracer.handle(&switch(
        5_000_000,
        0,
        task(0, 0, "swapper/0"),
        PrevState::Running,
        task(42, 42, "w"),
    ));

    assert_eq!(outcome, Some(SwitchOutcome::Idle));
    assert_eq!(tracer.pending_wakeups(), 1);
    assert!(rx.try_recv().is_err());
}

#[test]
fn test_learned_groups_attach_to_record() {
    let (tracer, rx) = Tracer::new(every_event());

    let mut prev = task(7, 7, "kworker");
    prev.cgroup_id = 700;
    let mut next = task(40, 42, "worker");
    next.cgroup_id = 4_200;

    tracer.handle(&wakeup(42, 0));
    tracer.handle(&switch(2_000_000, 0, prev, PrevState::Interruptible, next));

    let event = rx.try_recv().unwrap();
    assert_eq!(event.cgroup_id, 4_200);
    assert_eq!(event.prev_cgroup_id, 700);
}

#[test]
fn test_unknown_groups_report_zero() {
    let (tracer, rx) = Tracer::new(every_event());

    let mut prev = task(7, 7, "kworker");
    prev.cgroup_id = 700;
    tracer.handle(&wakeup(42, 0));
    tracer.handle(&switch(2_000_000, 0, prev, PrevState::Interruptible, task(40, 42, "worker")));
    let first = rx.try_recv().unwrap();
    assert_eq!(first.cgroup_id, 0);
    assert_eq!(first.prev_cgroup_id, 700);

    tracer.handle(&wakeup(43, 3_000_000));
    let next = task(40, 43, "helper");
    tracer.handle(&switch(5_000_000, 1, task(8, 8, "kworker"), PrevState::Interruptible, next));
    let second = rx.try_recv().unwrap();
    assert_eq!((second.cgroup_id, second.prev_cgroup_id), (0, 0));
}

#[test]
fn test_group_table_stays_bounded() {
    let (tracer, _rx) = Tracer::new(every_event());

    for tid in 1..=50_000u32 {
        let mut next = task(tid, tid, "w");
        next.cgroup_id = u64::from(tid);
        let ts = u64::from(tid) * 10;
        tracer.handle(&switch(ts, 0, task(9, 9, "x"), PrevState::Interruptible, next));
    }

    let bound = schedlat_common::TASK_META_CAPACITY as usize;
    assert!(tracer.known_groups() <= bound, "{} > {bound}", tracer.known_groups());
}

#[test]
fn test_in_window_events_are_throttled() {
    let options = TracerOptions {
        config: LatencyConfig { sample_ratio: 100, window_ns: 1_000_000, threshold_ns: 1 },
        cpus: 2,
        ..TracerOptions::default()
    };
    let (tracer, rx) = Tracer::with_random(options, NeverZero);

    for tid in 1..=3 {
        tracer.handle(&wakeup(tid, 0));
    }
    let a = tracer.handle(&switch(10_000, 0, task(9, 9, "x"), PrevState::Running, task(1, 1, "a")));
    let b = tracer.handle(&switch(20_000, 0, task(9, 9, "x"), PrevState::Running, task(2, 2, "b")));
    // Another CPU has its own window
    let c = tracer.handle(&switch(20_000, 1, task(9, 9, "x"), PrevState::Running, task(3, 3, "c")));

    assert!(matches!(a, Some(SwitchOutcome::Emitted { .. })));
    assert_eq!(b, Some(SwitchOutcome::Throttled));
    assert!(matches!(c, Some(SwitchOutcome::Emitted { .. })));
    assert_eq!(rx.try_iter().count(), 2);

    let counts = tracer.counts();
    assert_eq!(counts.throttled, 1);
    assert_eq!(counts.emitted, 2);
    assert_eq!(tracer.pending_wakeups(), 0);
}

#[test]
fn test_concurrent_cpus_each_report_their_threads() {
    const CPUS: u32 = 8;
    const PER_CPU: u32 = 500;

    let options = TracerOptions {
        channel_capacity: (CPUS * PER_CPU) as usize,
        ..every_event()
    };
    let (tracer, rx) = Tracer::new(options);

    thread::scope(|s| {
        for cpu in 0..CPUS {
            let tracer = &tracer;
            s.spawn(move || {
                for i in 0..PER_CPU {
                    let tid = 1 + cpu * PER_CPU + i;
                    let t0 = u64::from(i) * 10_000_000;
                    tracer.handle(&wakeup(tid, t0));
                    tracer.handle(&switch(
                        t0 + 2_000_000,
                        cpu,
                        task(100_000, 100_000, "prev"),
                        PrevState::Interruptible,
                        task(tid, tid, "w"),
                    ));
                }
            });
        }
    });

    let events: Vec<_> = rx.try_iter().collect();
    assert_eq!(events.len(), (CPUS * PER_CPU) as usize);
    assert!(events.iter().all(|e| e.delay_ns == 2_000_000));
    assert_eq!(tracer.counts().dropped, 0);
    assert_eq!(tracer.pending_wakeups(), 0);
}

#[test]
fn test_full_channel_drops_without_blocking() {
    let options = TracerOptions { channel_capacity: 1, ..every_event() };
    let (tracer, rx) = Tracer::new(options);

    for tid in 1..=3 {
        tracer.handle(&wakeup(tid, 0));
        let next = task(tid, tid, "w");
        tracer.handle(&switch(5_000_000, 0, task(9, 9, "x"), PrevState::Running, next));
    }

    assert_eq!(rx.try_iter().count(), 1);
    let counts = tracer.counts();
    assert_eq!(counts.emitted, 3);
    assert_eq!(counts.dropped, 2);
}
