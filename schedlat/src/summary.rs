//! Per-process latency summary.
//!
//! Aggregates [`LatencyEvent`]s as they arrive so the exit report does not
//! need to keep every record.
//!
//! ```text
//! LatencyEvent
//!     │
//!     ├──► processes[pid]          count, total, max, preemptions
//!     │
//!     └──► preempted[preempted_pid] (only when is_preempt == 1)
//! ```
//!
//! - `record()`: O(1) amortized
//! - `top_processes()` / `top_preempted()`: O(n log n) over distinct pids

// Milliseconds are for display only
#![allow(clippy::cast_precision_loss)]

use schedlat_common::LatencyEvent;
use std::collections::HashMap;

use crate::domain::Pid;

/// Default number of rows printed per table
pub const DEFAULT_TOP: usize = 10;

// =============================================================================
// OUTPUT TYPES
// =============================================================================

/// Scheduling delay suffered by one process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessLatency {
    pub pid: Pid,
    /// Thread name of the most recent reported thread
    pub comm: String,
    /// Reported delays
    pub events: u64,
    pub total_delay_ns: u64,
    pub max_delay_ns: u64,
    /// Reported delays where the CPU was taken from a runnable task
    pub preemptions: u64,
}

impl ProcessLatency {
    #[must_use]
    pub fn mean_delay_ns(&self) -> u64 {
        if self.events == 0 {
            0
        } else {
            self.total_delay_ns / self.events
        }
    }
}

/// A process that was switched out while still runnable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreemptedProcess {
    pub pid: Pid,
    pub comm: String,
    pub count: u64,
}

// =============================================================================
// AGGREGATOR
// =============================================================================

#[derive(Debug, Default)]
pub struct LatencySummary {
    processes: HashMap<u32, ProcessLatency>,
    preempted: HashMap<u32, PreemptedProcess>,
    total_events: u64,
}

impl LatencySummary {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &LatencyEvent) {
        self.total_events += 1;

        let entry = self.processes.entry(event.pid).or_insert_with(|| ProcessLatency {
            pid: Pid(event.pid),
            comm: String::new(),
            events: 0,
            total_delay_ns: 0,
            max_delay_ns: 0,
            preemptions: 0,
        });
        entry.comm.clear();
        entry.comm.push_str(event.comm_str());
        entry.events += 1;
        entry.total_delay_ns = entry.total_delay_ns.saturating_add(event.delay_ns);
        entry.max_delay_ns = entry.max_delay_ns.max(event.delay_ns);

        if event.is_preemption() {
            entry.preemptions += 1;

            let victim = self.preempted.entry(event.preempted_pid).or_insert_with(|| {
                PreemptedProcess {
                    pid: Pid(event.preempted_pid),
                    comm: String::new(),
                    count: 0,
                }
            });
            victim.comm.clear();
            victim.comm.push_str(event.preempted_comm_str());
            victim.count += 1;
        }
    }

    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.total_events
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_events == 0
    }

    #[must_use]
    pub fn process(&self, pid: Pid) -> Option<&ProcessLatency> {
        self.processes.get(&pid.0)
    }

    /// Processes ordered by total delay, largest first (ties by pid)
    #[must_use]
    pub fn top_processes(&self, limit: usize) -> Vec<ProcessLatency> {
        let mut rows: Vec<_> = self.processes.values().cloned().collect();
        rows.sort_by(|a, b| b.total_delay_ns.cmp(&a.total_delay_ns).then(a.pid.0.cmp(&b.pid.0)));
        rows.truncate(limit);
        rows
    }

    /// Preempted processes ordered by count, largest first (ties by pid)
    #[must_use]
    pub fn top_preempted(&self, limit: usize) -> Vec<PreemptedProcess> {
        let mut rows: Vec<_> = self.preempted.values().cloned().collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then(a.pid.0.cmp(&b.pid.0)));
        rows.truncate(limit);
        rows
    }
}

// =============================================================================
// DISPLAY
// =============================================================================

/// Print the per-process tables to stderr
pub fn display_summary(summary: &LatencySummary, limit: usize) {
    if summary.is_empty() {
        eprintln!("\nno scheduling delays above threshold");
        return;
    }

    eprintln!("\nTop processes by total scheduling delay ({} events):", summary.total_events());
    eprintln!(
        "  {:>8}  {:<16} {:>8} {:>12} {:>10} {:>10} {:>8}",
        "PID", "COMM", "EVENTS", "TOTAL(ms)", "MEAN(ms)", "MAX(ms)", "PREEMPT"
    );
    for row in summary.top_processes(limit) {
        eprintln!(
            "  {:>8}  {:<16} {:>8} {:>12.2} {:>10.2} {:>10.2} {:>8}",
            row.pid.0,
            row.comm,
            row.events,
            ms(row.total_delay_ns),
            ms(row.mean_delay_ns()),
            ms(row.max_delay_ns),
            row.preemptions
        );
    }

    let preempted = summary.top_preempted(limit);
    if !preempted.is_empty() {
        eprintln!("\nMost preempted processes:");
        eprintln!("  {:>8}  {:<16} {:>8}", "PID", "COMM", "COUNT");
        for row in preempted {
            eprintln!("  {:>8}  {:<16} {:>8}", row.pid.0, row.comm, row.count);
        }
    }
}

fn ms(ns: u64) -> f64 {
    ns as f64 / 1_000_000.0
}
