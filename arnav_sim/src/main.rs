//! ARNav Replay Simulator CLI
//!
//! Replays scripted walks through the demo mall and scores the
//! intelligence layer against ground truth.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{SystemTime, UNIX_EPOCH};

use arnav_core::IntelligenceConfig;
use arnav_sim::scenarios::ScenarioId;
use arnav_sim::{ScenarioResult, ScenarioRunner, SimError};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// ARNav deterministic replay CLI
#[derive(Parser, Debug)]
#[command(name = "arnav-sim")]
#[command(about = "Replay simulated walks through the ARNav intelligence layer", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (mall_entry, corridor_walk, boundary_dither,
    /// landmark_relocalization, poi_browse, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to run (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Override each scenario's duration, seconds
    #[arg(short, long)]
    duration: Option<f64>,

    /// Tick rate in Hz (default: the configured loop rate)
    #[arg(short, long)]
    rate: Option<f64>,

    /// JSON file overriding intelligence-layer tuning
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Drive ticks through the orchestrator's own loop instead of stepping
    #[arg(long)]
    looped: bool,

    /// Print the full validation report of every run
    #[arg(long)]
    report: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export sampled frames of a single scenario to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Export every Nth tick
    #[arg(long, default_value = "5")]
    export_interval: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !args.json {
        info!("ARNav Replay Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(s) => vec![s],
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!("Available scenarios: {}, all", names().join(", "));
                return ExitCode::from(2);
            }
        }
    };

    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(2);
        }
    };

    let base_seed = if args.seed == 0 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    let runner_for = |seed: u64| {
        let mut runner = ScenarioRunner::new(seed).with_config(config.clone());
        if let Some(d) = args.duration {
            runner = runner.with_duration(d);
        }
        if let Some(r) = args.rate {
            runner = runner.with_tick_rate(r);
        }
        runner
    };

    // Handle --export mode for a single scenario
    if let Some(export_path) = &args.export {
        let [scenario] = scenarios.as_slice() else {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            return ExitCode::from(2);
        };
        return run_export(&runner_for(base_seed), *scenario, args.export_interval, export_path);
    }

    let runtime = if args.looped {
        match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => Some(rt),
            Err(e) => {
                eprintln!("Error: cannot start runtime: {}", e);
                return ExitCode::from(2);
            }
        }
    } else {
        None
    };

    let mut all_results: Vec<ScenarioResult> = Vec::new();
    let mut errored = 0usize;

    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = runner_for(seed);

        for scenario in &scenarios {
            let outcome = match &runtime {
                Some(rt) => rt.block_on(runner.run_looped(*scenario)),
                None => runner.run(*scenario),
            };
            let result = match outcome {
                Ok(r) => r,
                Err(e) => {
                    error!("✗ {} (seed={}) could not run: {}", scenario.name(), seed, e);
                    errored += 1;
                    continue;
                }
            };

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
                if args.report {
                    result.report.print();
                }
            }
            all_results.push(result);
        }
    }

    let total = all_results.len() + errored;
    let failed_count = all_results.iter().filter(|r| !r.passed).count() + errored;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": total - failed_count,
            "failed": failed_count,
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "failure_reason": r.failure_reason,
                    "report": r.report,
                    "metrics": r.metrics,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(text) => println!("{}", text),
            Err(e) => error!("Failed to encode summary: {}", e),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);

            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn names() -> Vec<&'static str> {
    ScenarioId::all().iter().map(|s| s.name()).collect()
}

fn load_config(path: Option<&Path>) -> Result<IntelligenceConfig, SimError> {
    match path {
        Some(p) => Ok(IntelligenceConfig::from_file(p)?),
        None => Ok(IntelligenceConfig::default()),
    }
}

fn run_export(runner: &ScenarioRunner, scenario: ScenarioId, interval: u64, path: &Path) -> ExitCode {
    info!("Running {} with export to: {}", scenario.name(), path.display());

    let (result, export) = match runner.run_with_export(scenario, interval) {
        Ok(pair) => pair,
        Err(e) => {
            error!("✗ {} could not run: {}", scenario.name(), e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = export.write_to_file(path) {
        error!("Failed to write export: {}", e);
        return ExitCode::FAILURE;
    }
    info!("Exported {} frames to {}", export.frames.len(), path.display());

    if result.passed {
        info!("✓ {} (seed={}) PASSED", scenario.name(), runner.seed());
        ExitCode::SUCCESS
    } else {
        error!(
            "✗ {} FAILED: {}",
            scenario.name(),
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
        ExitCode::FAILURE
    }
}
