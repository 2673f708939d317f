//! # Cadence CLI
//!
//! Command-line harness that drives a Cadence activity against the built-in
//! simulated backend.
//!
//! ## Usage
//!
//! ```bash
//! # 100k cycles on 8 workers, 0.1% injected timeouts
//! cadence --cycles 100000 --workers 8 --error-rate 0.001
//!
//! # Single attempt per op, JSON summary to a file
//! cadence --max-tries 1 --output results.json
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cadence_core::instruments::InstrumentsSummary;
use cadence_core::op::OpDispenser;
use cadence_engine::{run, Activity, ActivityConfig, IntervalCycleSource, RunSummary};

mod diag;

use diag::{DiagReadDispenser, DiagScanDispenser, DiagSpace, DiagWriteDispenser};

#[derive(Parser)]
#[command(name = "cadence")]
#[command(version = "0.1.0")]
#[command(about = "Cycle-driven load generation harness", long_about = None)]
struct Cli {
    /// Number of cycles to run
    #[arg(short, long, default_value = "10000")]
    cycles: u64,

    /// Worker threads
    #[arg(short, long, default_value = "4")]
    workers: usize,

    /// Maximum attempts per op (1 = no retries)
    #[arg(short, long, default_value = "3")]
    max_tries: u32,

    /// Probability in [0,1] that a read op times out on its first attempt
    #[arg(long, default_value = "0.0")]
    error_rate: f64,

    /// Simulated per-op latency in microseconds
    #[arg(long, default_value = "50")]
    op_latency_us: u64,

    /// Mean simulated result size in bytes
    #[arg(long, default_value = "4096")]
    result_size: u64,

    /// Continuation pages per scan op (0 disables expansion)
    #[arg(long, default_value = "2")]
    scan_pages: u32,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output summary JSON to file
    #[arg(short, long)]
    output: Option<String>,
}

/// Everything one run produces, for JSON output
#[derive(Serialize)]
struct HarnessReport {
    run: RunSummary,
    instruments: InstrumentsSummary,
}

fn main() {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    if !(0.0..=1.0).contains(&cli.error_rate) {
        eprintln!("--error-rate must be within [0, 1]");
        std::process::exit(2);
    }

    let space = Arc::new(DiagSpace {
        op_latency: Duration::from_micros(cli.op_latency_us),
        error_rate: cli.error_rate,
        mean_result_size: cli.result_size,
    });

    // Reads dominate the mix 3:1:1, the way a typical benchmark would.
    let dispensers: Vec<(Arc<dyn OpDispenser<u64>>, u64)> = vec![
        (Arc::new(DiagReadDispenser::new(Arc::clone(&space))), 3),
        (Arc::new(DiagWriteDispenser::new(Arc::clone(&space))), 1),
        (
            Arc::new(DiagScanDispenser::new(Arc::clone(&space), cli.scan_pages)),
            1,
        ),
    ];

    let config = ActivityConfig {
        name: "diag".to_string(),
        max_tries: cli.max_tries,
        workers: cli.workers,
        cycles: cli.cycles,
    };

    let activity = match Activity::new(config, dispensers, diag::handler_chain()) {
        Ok(activity) => activity,
        Err(e) => {
            eprintln!("invalid activity configuration: {e}");
            std::process::exit(2);
        }
    };

    info!(
        cycles = cli.cycles,
        workers = cli.workers,
        max_tries = cli.max_tries,
        error_rate = cli.error_rate,
        "starting diag activity"
    );

    let source = IntervalCycleSource::new(0, cli.cycles);
    let summary = match run(&activity, &source) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("run aborted: {e}");
            std::process::exit(3);
        }
    };

    let instruments = activity.registry().summary();
    instruments.print_report();

    println!(
        "cycles: {}  ok: {}  errors: {}  last code: {}",
        summary.cycles_run, summary.ok_cycles, summary.error_cycles, summary.last_code
    );

    if let Some(output_path) = cli.output {
        let report = HarnessReport {
            run: summary,
            instruments,
        };
        let json = serde_json::to_string_pretty(&report).expect("Failed to serialize");
        std::fs::write(&output_path, json).expect("Failed to write output file");
        info!("Results saved to {}", output_path);
    }

    if summary.last_code != 0 {
        std::process::exit(1);
    }
}
