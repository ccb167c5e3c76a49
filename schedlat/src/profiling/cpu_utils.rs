//! CPU utility functions
//!
//! Utilities for querying CPU information from /sys filesystem.

use anyhow::{Context, Result};
use std::fs;

use crate::domain::CpuId;

const ONLINE_CPUS: &str = "/sys/devices/system/cpu/online";
const POSSIBLE_CPUS: &str = "/sys/devices/system/cpu/possible";

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// # Errors
/// Returns an error if the file is missing or malformed
pub fn online_cpus() -> Result<Vec<CpuId>> {
    let content =
        fs::read_to_string(ONLINE_CPUS).with_context(|| format!("Failed to read {ONLINE_CPUS}"))?;
    parse_cpu_list(&content)
}

/// Number of per-CPU slots needed to cover every CPU that may ever come online
///
/// Falls back to the available parallelism when /sys is unavailable.
#[must_use]
pub fn possible_cpu_count() -> usize {
    fs::read_to_string(POSSIBLE_CPUS)
        .ok()
        .and_then(|content| parse_cpu_list(&content).ok())
        .and_then(|cpus| cpus.iter().map(|cpu| cpu.0 as usize + 1).max())
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, usize::from))
}

/// Parse the kernel CPU list format: `"0-3"`, `"0-3,8-11"`, `"5"`
///
/// # Errors
/// Returns an error on a non-numeric entry
pub fn parse_cpu_list(content: &str) -> Result<Vec<CpuId>> {
    let mut cpus = Vec::new();

    for range in content.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse().with_context(|| format!("Bad CPU range: {range}"))?;
            let end: u32 = end.parse().with_context(|| format!("Bad CPU range: {range}"))?;
            cpus.extend((start..=end).map(CpuId));
        } else {
            let cpu: u32 = range.parse().with_context(|| format!("Bad CPU id: {range}"))?;
            cpus.push(CpuId(cpu));
        }
    }

    Ok(cpus)
}
