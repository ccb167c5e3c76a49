// Time conversions intentionally lose precision for display purposes
#![allow(clippy::cast_precision_loss)]

use schedlat_common::LatencyEvent;

use crate::domain::CgroupId;
use crate::tracer::TracerCounts;

/// One-line rendering of a latency record
#[must_use]
pub fn format_latency_event(event: &LatencyEvent) -> String {
    let delay_ms = event.delay_ns as f64 / 1_000_000.0;
    let mut line = format!(
        "[LATENCY] {delay_ms:.3}ms pid={} tid={} comm={} cgroup={}",
        event.pid,
        event.tid,
        event.comm_str(),
        CgroupId(event.cgroup_id)
    );
    if event.is_preemption() {
        line.push_str(&format!(
            " preempted={}:{} prev_cgroup={}",
            event.preempted_pid,
            event.preempted_comm_str(),
            CgroupId(event.prev_cgroup_id)
        ));
    }
    line
}

pub fn display_latency_event(event: &LatencyEvent) {
    println!("{}", format_latency_event(event));
}

/// Ring-buffer consumer counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub malformed: u64,
}

pub fn display_consumer_stats(stats: &ConsumerStats) {
    eprintln!("stats: received={} malformed={}", stats.received, stats.malformed);
}

/// Outcome breakdown of an in-process run
pub fn display_tracer_counts(counts: &TracerCounts) {
    eprintln!(
        "stats: wakeups={} switches={} idle={} no_wakeup={} throttled={} below_threshold={} \
         emitted={} preempted={} delivered={} dropped={}",
        counts.wakeups,
        counts.switches,
        counts.idle,
        counts.no_wakeup,
        counts.throttled,
        counts.below_threshold,
        counts.emitted,
        counts.preempted,
        counts.delivered,
        counts.dropped
    );
}
