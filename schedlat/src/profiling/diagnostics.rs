//! Kernel-side delivery counters

use anyhow::{Context, Result};
use aya::maps::{MapData, PerCpuArray, PerCpuValues};
use aya::Ebpf;

/// Records pushed to and rejected by the `EVENTS` ring buffer, summed over CPUs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryCounts {
    pub emitted: u64,
    pub dropped: u64,
}

/// Read `EMITTED_EVENTS` / `DROPPED_EVENTS`
///
/// # Errors
/// Returns an error if either counter map cannot be accessed
pub fn read_delivery_counts(bpf: &Ebpf) -> Result<DeliveryCounts> {
    Ok(DeliveryCounts {
        emitted: read_counter(bpf, "EMITTED_EVENTS")?,
        dropped: read_counter(bpf, "DROPPED_EVENTS")?,
    })
}

fn read_counter(bpf: &Ebpf, name: &str) -> Result<u64> {
    let map: PerCpuArray<&MapData, u64> =
        PerCpuArray::try_from(bpf.map(name).with_context(|| format!("{name} map not found"))?)?;
    let values = map.get(&0, 0).with_context(|| format!("Failed to read {name}"))?;
    Ok(sum_per_cpu(&values))
}

fn sum_per_cpu(values: &PerCpuValues<u64>) -> u64 {
    values.iter().fold(0u64, |acc, v| acc.saturating_add(*v))
}

/// Print delivery counters to stderr
///
/// # Errors
/// Returns an error if the counter maps cannot be read
pub fn print_delivery_diagnostics(bpf: &Ebpf) -> Result<()> {
    let counts = read_delivery_counts(bpf)?;
    eprintln!(
        "kernel: {} records emitted, {} dropped (ring buffer full)",
        counts.emitted, counts.dropped
    );
    if counts.dropped > 0 {
        eprintln!("warning: consumer fell behind; raise --threshold-us or --sample-ratio");
    }
    Ok(())
}
