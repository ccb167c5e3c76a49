//! # schedlat - Main Entry Point
//!
//! Supports two operational modes:
//! - **Live** (default): attach to the scheduler tracepoints and report delays until
//!   Ctrl+C or `--duration`
//! - **Replay** (`--replay trace.jsonl`): run recorded events through the in-process tracer
//!
//! Either mode can also write every reported delay to `--export FILE`.

use anyhow::{Context, Result};
use aya::maps::RingBuf;
use clap::Parser;
use crossbeam_channel::Receiver;
use log::info;
use schedlat_common::{LatencyEvent, RandomSource};
use std::path::Path;
use std::time::{Duration, Instant};

use schedlat::cli::Args;
use schedlat::domain::ReplayError;
use schedlat::export::JsonlExporter;
use schedlat::preflight::run_preflight_checks;
use schedlat::profiling::{
    attach_sched_tracepoints, display_consumer_stats, display_tracer_counts, init_ebpf_logger,
    load_ebpf_program, online_cpus, print_delivery_diagnostics, write_config, EventProcessor,
};
use schedlat::summary::display_summary;
use schedlat::tracer::{load_trace, SchedEvent, SeededRandom, Tracer, TracerOptions};

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;
const EXIT_NOPERM: i32 = 77;

/// Ring buffer poll interval
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    let msg = format!("{err:#}").to_lowercase();
    if msg.contains("permission denied") || msg.contains("requires root") {
        EXIT_NOPERM
    } else if err.chain().any(|cause| cause.is::<ReplayError>()) {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

#[tokio::main]
async fn run() -> Result<()> {
    let args = Args::parse();

    if let Some(ref path) = args.replay {
        return replay(&args, path);
    }

    live(&args).await
}

// =============================================================================
// REPLAY
// =============================================================================

fn replay(args: &Args, path: &Path) -> Result<()> {
    let events =
        load_trace(path).with_context(|| format!("Failed to load trace {}", path.display()))?;

    let highest_cpu = events
        .iter()
        .filter_map(|event| match event {
            SchedEvent::Switch { cpu, .. } => Some(*cpu),
            SchedEvent::Wakeup { .. } => None,
        })
        .max()
        .unwrap_or(0);
    let options = TracerOptions { config: args.latency_config(), ..TracerOptions::default() }
        .covering_cpu(highest_cpu);
    let mut processor = event_processor(args)?;

    if !args.quiet {
        println!("schedlat v{}", env!("CARGO_PKG_VERSION"));
        println!("replay: {} ({} events)", path.display(), events.len());
    }

    match args.seed {
        Some(seed) => {
            let (tracer, rx) = Tracer::with_random(options, SeededRandom::new(seed));
            replay_events(&mut processor, &tracer, &rx, &events);
        }
        None => {
            let (tracer, rx) = Tracer::new(options);
            replay_events(&mut processor, &tracer, &rx, &events);
        }
    }

    finish_export(&mut processor)?;
    display_summary(processor.summary(), args.top);
    Ok(())
}

fn replay_events<R: RandomSource>(
    processor: &mut EventProcessor,
    tracer: &Tracer<R>,
    rx: &Receiver<LatencyEvent>,
    events: &[SchedEvent],
) {
    for event in events {
        tracer.handle(event);
        // Drain as we go so the bounded channel never fills
        for latency in rx.try_iter() {
            processor.process_event(latency);
        }
    }

    display_tracer_counts(&tracer.counts());
}

// =============================================================================
// OUTPUT
// =============================================================================

fn event_processor(args: &Args) -> Result<EventProcessor> {
    let processor = EventProcessor::new(args.quiet);
    match args.export {
        Some(ref path) => {
            info!("Exporting latency records to {}", path.display());
            Ok(processor.with_exporter(JsonlExporter::create(path)?))
        }
        None => Ok(processor),
    }
}

fn finish_export(processor: &mut EventProcessor) -> Result<()> {
    if let Some(written) = processor.finish_export()? {
        eprintln!("export: {written} records written");
    }
    Ok(())
}

// =============================================================================
// LIVE
// =============================================================================

async fn live(args: &Args) -> Result<()> {
    let quiet = args.quiet;
    let config = args.latency_config();

    run_preflight_checks(&args.ebpf_object)?;

    if !quiet {
        println!("schedlat v{}", env!("CARGO_PKG_VERSION"));
        println!(
            "threshold: {}µs, window: {}µs, in-window sampling: 1/{}",
            config.threshold_ns / 1_000,
            config.window_ns / 1_000,
            config.sample_ratio
        );
    }

    let cpus = online_cpus()?;
    info!("Tracing {} online CPUs", cpus.len());

    let mut bpf = load_ebpf_program(&args.ebpf_object)?;
    init_ebpf_logger(&mut bpf);

    // Tunables must be in place before the first switch is observed
    write_config(&mut bpf, &config)?;
    attach_sched_tracepoints(&mut bpf)?;

    let mut ring_buf =
        RingBuf::try_from(bpf.take_map("EVENTS").context("EVENTS map not found")?)?;

    let mut processor = event_processor(args)?;
    let mut last_status_time = Instant::now();

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let started = Instant::now();
    let duration_limit =
        if args.duration > 0 { Some(Duration::from_secs(args.duration)) } else { None };
    let mut exit_reason = "interrupted";

    loop {
        if let Some(limit) = duration_limit {
            if started.elapsed() >= limit {
                exit_reason = "duration limit reached";
                break;
            }
        }

        while let Some(item) = ring_buf.next() {
            processor.process_bytes(&item);
        }

        if processor.stats.received == 0 && last_status_time.elapsed() > Duration::from_secs(10) {
            info!("Still waiting for events... (no delays above threshold yet)");
            last_status_time = Instant::now();
        }

        tokio::select! {
            () = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = &mut ctrl_c => {
                break;
            }
        }
    }

    // Records still queued when the loop stopped
    while let Some(item) = ring_buf.next() {
        processor.process_bytes(&item);
    }

    eprintln!("\n{exit_reason}: {:.1}s", started.elapsed().as_secs_f64());
    display_consumer_stats(&processor.stats);
    print_delivery_diagnostics(&bpf)?;
    finish_export(&mut processor)?;
    display_summary(processor.summary(), args.top);

    Ok(())
}
