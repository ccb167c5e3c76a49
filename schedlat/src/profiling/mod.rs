//! Kernel-side tracing: eBPF setup, ring-buffer consumption and reporting
//!
//! - eBPF program loading, configuration and attachment
//! - Ring-buffer record decoding and routing
//! - Event display formatting
//! - Delivery diagnostics
//! - CPU utilities

pub mod cpu_utils;
pub mod diagnostics;
pub mod ebpf_setup;
pub mod event_display;
pub mod event_processor;

pub use cpu_utils::{online_cpus, possible_cpu_count};
pub use diagnostics::{print_delivery_diagnostics, read_delivery_counts, DeliveryCounts};
pub use ebpf_setup::{attach_sched_tracepoints, init_ebpf_logger, load_ebpf_program, write_config};
pub use event_display::{
    display_consumer_stats, display_latency_event, display_tracer_counts, format_latency_event,
    ConsumerStats,
};
pub use event_processor::{decode_event, EventProcessor};
