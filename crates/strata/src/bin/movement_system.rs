//! # STRATA Movement System
//!
//! Populates a grid of entities and runs the flocking movement system on
//! the tick scheduler.
//!
//! ```bash
//! movement_system --ticks 600 --entities 10000 --seed 42
//! movement_system --config sim.toml -v
//! ```
//!
//! Exits with status 1 when the simulation aborts.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use strata::core::{RunSummary, Simulation, SimulationConfig, TickScheduler};
use strata::{populate, register_components, MovementSystem, MOVEMENT_LAYER};

#[derive(Parser)]
#[command(name = "movement_system", about = "Seeded flocking movement on the STRATA tick scheduler")]
struct Cli {
    /// Ticks to run; overrides `max_ticks` from the config file
    #[arg(short, long)]
    ticks: Option<u64>,
    /// Number of entities to spawn
    #[arg(short, long, default_value = "1000")]
    entities: usize,
    /// RNG seed for the initial velocities
    #[arg(short, long, default_value = "42")]
    seed: u64,
    /// TOML simulation config
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

const DEFAULT_TICKS: u64 = 600;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(&cli) {
        Ok(summary) => {
            info!(
                ticks = summary.ticks,
                final_tick = summary.final_tick,
                stopped = summary.stopped,
                "Run finished"
            );
            println!(
                "ticks={} avg_tick_us={} max_tick_us={} late_ticks={}",
                summary.ticks, summary.stats.avg_tick_us, summary.stats.max_tick_us, summary.stats.late_ticks
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<RunSummary> {
    let mut config = match &cli.config {
        Some(path) => SimulationConfig::from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SimulationConfig::default().with_max_ticks(DEFAULT_TICKS),
    };
    if let Some(ticks) = cli.ticks {
        config.max_ticks = Some(ticks);
    }
    config.max_entities = config.max_entities.max(cli.entities);
    let config = register_components(config);

    let sim = Simulation::new(config).context("creating simulation")?;
    populate(&sim, cli.entities, cli.seed).context("populating entities")?;
    info!(entities = cli.entities, seed = cli.seed, layer = MOVEMENT_LAYER, "World populated");

    let mut scheduler = TickScheduler::new(sim);
    let mut system = MovementSystem::default();
    let summary = scheduler
        .run(
            MOVEMENT_LAYER,
            |entities, system: &mut MovementSystem, ticks_fired| system.tick(entities, ticks_fired),
            &mut system,
        )
        .context("movement run aborted")?;
    info!(updates = system.moved(), "Movement system done");
    Ok(summary)
}
