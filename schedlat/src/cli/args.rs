//! CLI argument definitions

use clap::Parser;
use schedlat_common::{LatencyConfig, DEFAULT_SAMPLE_RATIO};
use std::path::PathBuf;

use crate::summary::DEFAULT_TOP;

/// Where `cargo xtask build-ebpf` leaves the kernel object
pub const DEFAULT_EBPF_OBJECT: &str = "target/bpfel-unknown-none/release/schedlat";

#[derive(Parser, Debug)]
#[command(
    name = "schedlat",
    about = "Measure how long woken threads wait for a CPU",
    after_help = "\
EXAMPLES:
    sudo schedlat                              Trace all CPUs until Ctrl+C
    sudo schedlat --threshold-us 5000 --duration 30
    sudo schedlat --quiet --export latency.jsonl
    schedlat --replay trace.jsonl --seed 7     Analyze a recorded trace"
)]
pub struct Args {
    /// Report delays of at least this many microseconds
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    pub threshold_us: u64,

    /// Guaranteed-sample spacing per CPU, in microseconds
    #[arg(long, default_value = "1000", value_parser = clap::value_parser!(u64).range(1..))]
    pub window_us: u64,

    /// Sample 1 in N events inside the window (1 = every event)
    #[arg(
        long,
        default_value_t = DEFAULT_SAMPLE_RATIO,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub sample_ratio: u32,

    /// Stop after N seconds (0 = unlimited)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// Compiled tracepoint programs
    #[arg(long, value_name = "FILE", default_value = DEFAULT_EBPF_OBJECT)]
    pub ebpf_object: PathBuf,

    /// Analyze a JSON Lines trace instead of tracing the kernel
    #[arg(long, value_name = "FILE")]
    pub replay: Option<PathBuf>,

    /// Also write every reported delay to FILE as JSON Lines
    #[arg(long, value_name = "FILE")]
    pub export: Option<PathBuf>,

    /// Seed for replay sampling (reproducible output)
    #[arg(long, requires = "replay")]
    pub seed: Option<u64>,

    /// Rows per summary table
    #[arg(long, default_value_t = DEFAULT_TOP)]
    pub top: usize,

    /// Print only the summary, not each event
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    #[must_use]
    pub fn latency_config(&self) -> LatencyConfig {
        LatencyConfig {
            window_ns: self.window_us.saturating_mul(1_000),
            sample_ratio: self.sample_ratio,
            threshold_ns: self.threshold_us.saturating_mul(1_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_core_defaults() {
        let args = Args::parse_from(["schedlat"]);
        assert_eq!(args.latency_config(), LatencyConfig::default());
        assert_eq!(args.ebpf_object, PathBuf::from(DEFAULT_EBPF_OBJECT));
        assert_eq!(args.top, DEFAULT_TOP);
        assert!(args.replay.is_none());
        assert!(args.export.is_none());
    }

    #[test]
    fn test_export_allowed_in_both_modes() {
        let live = Args::parse_from(["schedlat", "--export", "out.jsonl"]);
        assert_eq!(live.export, Some(PathBuf::from("out.jsonl")));
        let replay = Args::parse_from(["schedlat", "--replay", "t.jsonl", "--export", "o.jsonl"]);
        assert_eq!(replay.export, Some(PathBuf::from("o.jsonl")));
    }

    #[test]
    fn test_microseconds_become_nanoseconds() {
        let args = Args::parse_from([
            "schedlat",
            "--threshold-us",
            "250",
            "--window-us",
            "2000",
            "--sample-ratio",
            "10",
        ]);
        let config = args.latency_config();
        assert_eq!(config.threshold_ns, 250_000);
        assert_eq!(config.window_ns, 2_000_000);
        assert_eq!(config.sample_ratio, 10);
    }

    #[test]
    fn test_zero_threshold_rejected() {
        assert!(Args::try_parse_from(["schedlat", "--threshold-us", "0"]).is_err());
    }

    #[test]
    fn test_seed_requires_replay() {
        assert!(Args::try_parse_from(["schedlat", "--seed", "1"]).is_err());
        let args = Args::parse_from(["schedlat", "--replay", "t.jsonl", "--seed", "1"]);
        assert_eq!(args.seed, Some(1));
    }
}
