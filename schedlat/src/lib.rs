//! # schedlat - Scheduling Latency Tracer
//!
//! Measures, per thread, the time between the kernel marking a thread runnable
//! (`sched_wakeup`) and that thread actually getting a CPU (`sched_switch`),
//! and reports the delays that exceed a threshold together with what was
//! running before (and whether it was preempted).
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Linux Scheduler                            │
//! │      sched_wakeup / sched_wakeup_new          sched_switch      │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │ tracepoints
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                eBPF Programs (schedlat-ebpf)                    │
//! │  WAKEUP_TIMES ─▶ SwitchAnalyzer ◀─ LAST_SAMPLE / CONFIG         │
//! │                        │                                        │
//! │                        ▼ LatencyEvent (80 bytes)                │
//! │                     EVENTS ring buffer                          │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   schedlat (This Crate)                         │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐         │
//! │  │  Profiling   │──▶│    Event     │──▶│   Summary    │         │
//! │  │   (eBPF)     │   │  Processor   │   │ (per pid)    │         │
//! │  └──────────────┘   └──────────────┘   └──────────────┘         │
//! │                            ▲                                    │
//! │  ┌──────────────┐          │                                    │
//! │  │   Tracer     │──────────┘  (replay of recorded events)       │
//! │  │ (in-process) │                                               │
//! │  └──────────────┘                                               │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The wake-up/switch correlation, throttling and filtering live in
//! `schedlat-common` and are shared verbatim by the kernel programs and the
//! in-process [`tracer`].
//!
//! ## Module Structure
//!
//! - [`profiling`]: eBPF loading, `CONFIG` setup, tracepoint attachment,
//!   ring-buffer decoding, display and delivery diagnostics
//! - [`tracer`]: the shared core backed by concurrent userspace structures,
//!   plus JSON Lines trace replay
//! - [`summary`]: per-process aggregation printed at exit
//! - [`export`]: JSON Lines output of every reported delay (`--export`)
//! - [`preflight`]: privilege, kernel and object-file checks
//! - [`cli`]: command-line arguments
//! - [`domain`]: core types (Pid, Tid, CpuId, CgroupId) and errors
//!
//! ## Typical Usage
//!
//! ```bash
//! # Build the kernel programs, then trace until Ctrl+C
//! cargo xtask build-ebpf
//! sudo ./target/release/schedlat --threshold-us 2000
//!
//! # Analyze a recorded trace (no privileges needed)
//! ./target/release/schedlat --replay trace.jsonl --sample-ratio 1
//!
//! # Keep every reported delay for later processing
//! sudo ./target/release/schedlat --quiet --export latency.jsonl
//! ```

pub mod cli;
pub mod domain;
pub mod export;
pub mod preflight;
pub mod profiling;
pub mod summary;
pub mod tracer;
