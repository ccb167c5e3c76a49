//! Pre-flight checks for schedlat
//!
//! Validates system requirements before attempting to load eBPF programs.
//! Provides clear, actionable error messages when requirements aren't met.

#![allow(unsafe_code)] // geteuid() requires unsafe

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::domain::TracerError;

/// First kernel with BPF ring buffers
const MIN_KERNEL_VERSION: (u32, u32) = (5, 8);

/// Run all pre-flight checks before eBPF loading
///
/// # Errors
/// Returns the first failed requirement
pub fn run_preflight_checks(ebpf_object: &Path) -> Result<()> {
    check_privileges()?;
    check_kernel_version()?;
    check_object_exists(ebpf_object)?;
    Ok(())
}

/// Check if running with sufficient privileges for eBPF
fn check_privileges() -> Result<()> {
    if unsafe { libc::geteuid() } == 0 {
        return Ok(());
    }

    // CAP_BPF + CAP_PERFMON would also do; only root is accepted for now
    bail!(
        "Permission denied: schedlat requires root privileges to attach scheduler tracepoints.\n\n\
         Run with: sudo schedlat ...\n\
         Or analyze a recorded trace without privileges: schedlat --replay FILE"
    );
}

fn check_kernel_version() -> Result<()> {
    let version_str = std::fs::read_to_string("/proc/version")
        .context("Failed to read kernel version from /proc/version")?;

    // "Linux version 6.1.0-arch1-1 ..."
    let release = version_str.split_whitespace().nth(2).unwrap_or("unknown");

    let Some((major, minor)) = parse_release(release) else {
        // Unparseable release strings are let through
        return Ok(());
    };

    if (major, minor) < MIN_KERNEL_VERSION {
        bail!(
            "Kernel version {major}.{minor} is too old.\n\n\
             schedlat requires Linux {}.{} or newer for eBPF ring buffer support.\n\
             Current kernel: {release}",
            MIN_KERNEL_VERSION.0,
            MIN_KERNEL_VERSION.1,
        );
    }

    Ok(())
}

/// `"5.15.0-generic"` → `(5, 15)`
fn parse_release(release: &str) -> Option<(u32, u32)> {
    let mut parts = release.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor: String = parts.next()?.chars().take_while(char::is_ascii_digit).collect();
    Some((major, minor.parse().ok()?))
}

fn check_object_exists(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(TracerError::ObjectNotFound(path.to_path_buf()))
            .context("Build it with: cargo xtask build-ebpf, or pass --ebpf-object");
    }
    Ok(())
}
