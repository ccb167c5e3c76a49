//! # eBPF Program Loading and Attachment
//!
//! Loads the compiled tracepoint programs and attaches them to the scheduler.
//!
//! ## Functions
//!
//! - [`load_ebpf_program()`] - Load the eBPF object from disk
//! - [`write_config()`] - Store tunables in the `CONFIG` map
//! - [`attach_sched_tracepoints()`] - Attach wake-up and switch hooks
//!
//! ## Attachment Points
//!
//! | Program            | Tracepoint               |
//! |--------------------|--------------------------|
//! | `sched_wakeup`     | `sched/sched_wakeup`     |
//! | `sched_wakeup_new` | `sched/sched_wakeup_new` |
//! | `sched_switch`     | `sched/sched_switch`     |
//!
//! `CONFIG` must be written before attaching: the programs read it on every
//! switch and fall back to defaults for missing keys.

use anyhow::{Context, Result};
use aya::{maps::HashMap, programs::TracePoint, Ebpf};
use aya_log::EbpfLogger;
use log::{info, warn};
use schedlat_common::{
    LatencyConfig, CONFIG_SAMPLE_RATIO, CONFIG_THRESHOLD_NS, CONFIG_WINDOW_NS,
};
use std::path::Path;

use crate::domain::TracerError;

/// Attach order: wake-up hooks before the switch hook
const SCHED_TRACEPOINTS: [&str; 3] = ["sched_wakeup", "sched_wakeup_new", "sched_switch"];

/// Load the eBPF object file
///
/// The object is always built in release mode: debug BPF builds pull in
/// formatting code the BPF linker rejects.
///
/// # Errors
/// Returns an error if the object is missing or the kernel rejects it
pub fn load_ebpf_program(path: &Path) -> Result<Ebpf> {
    if !path.is_file() {
        return Err(TracerError::ObjectNotFound(path.to_path_buf()).into());
    }
    let bpf = Ebpf::load_file(path)
        .map_err(|e| TracerError::EbpfLoadFailed(e.to_string()))
        .with_context(|| format!("Loading {}", path.display()))?;
    Ok(bpf)
}

/// Initialize eBPF logger
pub fn init_ebpf_logger(bpf: &mut Ebpf) {
    if let Err(e) = EbpfLogger::init(bpf) {
        warn!("Failed to initialize eBPF logger: {e}");
    }
}

/// Write throttle window, sampling ratio and threshold into `CONFIG`
///
/// # Errors
/// Returns an error if the map is missing or an insert fails
pub fn write_config(bpf: &mut Ebpf, config: &LatencyConfig) -> Result<()> {
    let mut config_map: HashMap<_, u32, u64> =
        HashMap::try_from(bpf.map_mut("CONFIG").ok_or(TracerError::MapNotFound("CONFIG"))?)
            .map_err(TracerError::from)?;

    config_map.insert(CONFIG_WINDOW_NS, config.window_ns, 0).map_err(TracerError::from)?;
    config_map
        .insert(CONFIG_SAMPLE_RATIO, u64::from(config.sample_ratio), 0)
        .map_err(TracerError::from)?;
    config_map.insert(CONFIG_THRESHOLD_NS, config.threshold_ns, 0).map_err(TracerError::from)?;

    info!(
        "✓ Config: window={}µs ratio=1/{} threshold={}µs",
        config.window_ns / 1_000,
        config.sample_ratio,
        config.threshold_ns / 1_000
    );
    Ok(())
}

/// Load and attach every scheduler tracepoint program
///
/// # Errors
/// Returns [`TracerError::ProbeAttachFailed`] naming the first program that
/// could not be loaded or attached
pub fn attach_sched_tracepoints(bpf: &mut Ebpf) -> Result<()> {
    for name in SCHED_TRACEPOINTS {
        attach_tracepoint(bpf, name).map_err(|e| TracerError::ProbeAttachFailed {
            probe: format!("sched/{name}"),
            error: format!("{e:#}"),
        })?;
        info!("✓ Attached tracepoint: sched/{name}");
    }
    Ok(())
}

fn attach_tracepoint(bpf: &mut Ebpf, name: &str) -> Result<()> {
    let program: &mut TracePoint = bpf
        .program_mut(name)
        .with_context(|| format!("{name} program not found"))?
        .try_into()?;
    program.load()?;
    program.attach("sched", name)?;
    Ok(())
}
