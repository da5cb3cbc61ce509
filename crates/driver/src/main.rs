//! Swarm migration driver
//!
//! Loads a JSON run configuration, runs it on one thread per rank and prints
//! a per-rank summary.
//!
//! Usage: `driver <config.json> [--ranks N] [--steps N] [--dt SECONDS]`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orchestrator::{run_distributed, DistributedResult, OrchestratorError, RunConfig};

#[derive(Parser, Debug)]
#[command(name = "driver")]
#[command(about = "Advect particles through a slab-decomposed grid and migrate them between ranks")]
struct Args {
    /// Path to the run configuration (JSON)
    config: PathBuf,

    /// Override the number of ranks
    #[arg(long)]
    ranks: Option<usize>,

    /// Override the number of steps
    #[arg(long)]
    steps: Option<u64>,

    /// Override dt (seconds per step)
    #[arg(long)]
    dt: Option<f64>,

    /// Skip the before/after particle count check on every pass
    #[arg(long)]
    no_defensive: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "driver=info,orchestrator=info,swarm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(result) => {
            print_summary(&result);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<DistributedResult, OrchestratorError> {
    let mut config = RunConfig::load(&args.config)?;
    tracing::info!("Loaded run config '{}' from {}", config.name, args.config.display());

    if let Some(ranks) = args.ranks {
        config.ranks = ranks;
    }
    if let Some(steps) = args.steps {
        config.steps = steps;
    }
    if let Some(dt) = args.dt {
        config.dt = dt;
    }
    if args.no_defensive {
        config.swarm.defensive = false;
    }
    config.validate()?;

    let result = run_distributed(&config)?;
    let expected = config.initial_particle_count();
    if result.total_particles() != expected {
        tracing::warn!(
            "particle total changed over the run: {} placed, {} held",
            expected,
            result.total_particles()
        );
    }
    Ok(result)
}

fn print_summary(result: &DistributedResult) {
    println!(
        "{} steps, {:.6}s simulated, {} particles",
        result.steps,
        result.sim_time,
        result.total_particles()
    );
    println!(
        "{:>4} {:>9} {:>9} {:>8} {:>11} {:>11} {:>11} {:>11} {:>12}",
        "rank", "initial", "final", "foreign", "shadow out", "shadow in", "global out",
        "claimed", "max pass"
    );
    for r in &result.ranks {
        let max_pass = r
            .max_pass_time
            .map(|t| format!("{:.3}ms", t.as_secs_f64() * 1e3))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4} {:>9} {:>9} {:>8} {:>11} {:>11} {:>11} {:>11} {:>12}",
            r.rank,
            r.initial_count,
            r.final_count,
            r.foreign,
            r.shadow_sent,
            r.shadow_received,
            r.global_sent,
            r.global_claimed,
            max_pass
        );
    }
}
