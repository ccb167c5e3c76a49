use anyhow::{bail, Context, Result};
use clap::Parser;
use std::process::Command;

/// Kernel-side package and the object it produces
const EBPF_PACKAGE: &str = "schedlat-ebpf";
const EBPF_TARGET: &str = "bpfel-unknown-none";

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Compile the tracepoint programs
    BuildEbpf {
        #[arg(long, default_value = EBPF_TARGET)]
        target: String,
    },
    /// Build everything and run the tracer under sudo
    Run {
        /// Arguments forwarded to schedlat
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Cmd::BuildEbpf { target } => build_ebpf(&target)?,
        Cmd::Run { args } => run(&args)?,
    }

    Ok(())
}

fn build_ebpf(target: &str) -> Result<()> {
    // Debug BPF builds pull in formatting code the BPF linker rejects, so the
    // object is always built with the release profile.
    let status = Command::new("cargo")
        .args(["+nightly", "build", "--package", EBPF_PACKAGE, "--target", target])
        .args(["-Z", "build-std=core", "--release"])
        .status()
        .context("Failed to spawn cargo for the eBPF build")?;

    if !status.success() {
        bail!("Failed to build {EBPF_PACKAGE}");
    }

    println!("✓ eBPF object: target/{target}/release/schedlat");
    Ok(())
}

fn run(forwarded: &[String]) -> Result<()> {
    build_ebpf(EBPF_TARGET)?;

    let status = Command::new("cargo")
        .args(["build", "--release", "--package", "schedlat"])
        .status()
        .context("Failed to spawn cargo for the userspace build")?;
    if !status.success() {
        bail!("Failed to build schedlat");
    }

    let status = Command::new("sudo")
        .arg("-E")
        .arg("target/release/schedlat")
        .args(forwarded)
        .status()
        .context("Failed to launch schedlat")?;
    if !status.success() {
        bail!("schedlat exited with {status}");
    }

    Ok(())
}
