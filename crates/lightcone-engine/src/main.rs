//! Engine binary for the Lightcone simulation.
//!
//! Loads configuration, seeds a universe with moving agents, and runs the
//! tick cycle for the configured number of turns, logging per-tick view
//! statistics.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `lightcone-config.yaml` (or the path given as
//!    the first argument)
//! 2. Initialize structured logging (tracing)
//! 3. Create the universe with inertial motion
//! 4. Spawn seed agents from the run seed
//! 5. Run the tick loop
//! 6. Log the result

mod error;
mod spawner;
mod steer;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use lightcone_core::config::{LoggingConfig, SimulationConfig};
use lightcone_core::motion::Inertial;
use lightcone_core::universe::{ObserverViews, Universe};
use lightcone_world::tracing_sink;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::steer::Steer;

/// Default configuration file, relative to the working directory.
const CONFIG_PATH: &str = "lightcone-config.yaml";

/// Chance per tick that an observer plans a course change.
const STEER_CHANCE: f64 = 0.25;

/// Course changes are drawn up to this multiple of the speed of light, so
/// some fail their self-check.
const STEER_OVERSHOOT: f64 = 1.25;

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration loading, spawning, or any tick fails.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!(
        dims = %config.universe.dims(),
        speed_of_light = config.universe.speed_of_light,
        ticks = config.run.ticks,
        seed = config.run.seed,
        "lightcone-engine starting"
    );

    // 3. Create the universe.
    let mut universe = Universe::new(config.universe.clone(), Box::new(Inertial), tracing_sink());
    info!(
        history_depth = universe.history().depth(),
        "Universe initialized"
    );

    // 4. Spawn seed agents.
    let mut rng = StdRng::seed_from_u64(config.run.seed);
    spawner::spawn_seed_agents(&mut universe, &config.run, &mut rng)?;

    // 5. Run the tick loop.
    let mut totals = TickStats::default();
    for _ in 0..config.run.ticks {
        let stats = run_tick(&mut universe, &mut rng)?;
        totals.absorb(&stats);
    }

    // 6. Log the result.
    info!(
        final_time = universe.time(),
        agents = universe.len(),
        steered = totals.steered,
        rejected = totals.rejected,
        "Simulation complete"
    );
    Ok(())
}

/// Counters for one tick (or, summed, for the whole run).
#[derive(Debug, Clone, Copy, Default)]
struct TickStats {
    steered: usize,
    rejected: usize,
}

impl TickStats {
    fn absorb(&mut self, other: &Self) {
        self.steered = self.steered.saturating_add(other.steered);
        self.rejected = self.rejected.saturating_add(other.rejected);
    }
}

/// One full cycle: record, view, plan, commit, advance.
fn run_tick(universe: &mut Universe, rng: &mut impl Rng) -> Result<TickStats, EngineError> {
    universe.record_tick()?;
    let views = universe.observer_views();
    log_view_stats(universe.time(), &views);

    let top_speed = universe.settings().speed_of_light * STEER_OVERSHOOT;
    let mut stats = TickStats::default();
    for observer in views.keys().copied() {
        if !rng.random_bool(STEER_CHANCE) {
            continue;
        }
        let mut plan = universe.sandbox_for(&views, observer)?;
        let velocity = spawner::random_velocity(&mut *rng, top_speed);
        let result = plan.add_command(Arc::new(Steer::new(observer, velocity)));
        if plan.commands().is_empty() {
            debug!(
                agent = %observer,
                error = %result.error_message,
                "Course change rejected while planning"
            );
            stats.rejected = stats.rejected.saturating_add(1);
            continue;
        }
        let committed = universe.submit_plan(&plan)?;
        let succeeded = committed.iter().filter(|r| r.success).count();
        stats.steered = stats.steered.saturating_add(succeeded);
        stats.rejected = stats
            .rejected
            .saturating_add(committed.len().saturating_sub(succeeded));
    }

    universe.advance();
    Ok(stats)
}

fn log_view_stats(time: i32, views: &ObserverViews) {
    let distinct: BTreeSet<*const _> = views.values().map(Arc::as_ptr).collect();
    let centers: BTreeSet<_> = views.values().map(|v| v.center()).collect();
    let visible: usize = views.values().map(|v| v.view().len()).sum();
    let peers: usize = views.values().map(|v| v.peers().len()).sum();
    info!(
        time,
        observers = views.len(),
        groups = distinct.len(),
        cells = centers.len(),
        visible,
        peers,
        "Tick views built"
    );
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Load configuration from the path given as the first argument, else
/// `lightcone-config.yaml`. A missing default file means defaults.
fn load_config() -> Result<SimulationConfig, EngineError> {
    if let Some(path) = std::env::args_os().nth(1).map(PathBuf::from) {
        return Ok(SimulationConfig::from_file(&path)?);
    }
    let config_path = PathBuf::from(CONFIG_PATH);
    if config_path.exists() {
        Ok(SimulationConfig::from_file(&config_path)?)
    } else {
        Ok(SimulationConfig::default())
    }
}
