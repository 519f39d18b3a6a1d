//! Agent spawner for seeding the universe.
//!
//! At simulation start the spawner places `run.agent_count` agents at
//! uniformly random positions, each moving in a random direction at up to
//! `run.max_speed` times the speed of light. The same seed always yields
//! the same population.

use lightcone_core::config::RunConfig;
use lightcone_core::universe::Universe;
use lightcone_types::{AgentId, Double3D, Velocity};
use rand::Rng;
use tracing::info;

use crate::error::EngineError;

/// Spawn the initial population.
///
/// # Errors
///
/// Returns [`EngineError::Spawner`] if the universe has no room for agents,
/// or [`EngineError::Universe`] if a generated position is rejected.
pub fn spawn_seed_agents<R: Rng>(
    universe: &mut Universe,
    run: &RunConfig,
    rng: &mut R,
) -> Result<Vec<AgentId>, EngineError> {
    let settings = universe.settings().clone();
    if settings.cell_count() == 0 {
        return Err(EngineError::Spawner {
            message: String::from("universe has no cells"),
        });
    }
    let top_speed = run.max_speed * settings.speed_of_light;

    let mut ids = Vec::new();
    for _ in 0..run.agent_count {
        let position = Double3D::new(
            rng.random_range(0.0..f64::from(settings.x_dim)),
            rng.random_range(0.0..f64::from(settings.y_dim)),
            rng.random_range(0.0..f64::from(settings.z_dim)),
        );
        let velocity = random_velocity(&mut *rng, top_speed);
        ids.push(universe.spawn(position, velocity)?);
    }

    info!(agents = ids.len(), top_speed, "Seed agents spawned");
    Ok(ids)
}

/// A velocity in a uniformly random direction with speed in `0..=top_speed`.
pub fn random_velocity(rng: &mut impl Rng, top_speed: f64) -> Velocity {
    let theta = rng.random_range(0.0..std::f64::consts::TAU);
    let cos_phi: f64 = rng.random_range(-1.0..=1.0);
    let sin_phi = cos_phi.mul_add(-cos_phi, 1.0).max(0.0).sqrt();
    let speed = rng.random_range(0.0..=top_speed.max(0.0));
    Velocity::new(
        speed * sin_phi * theta.cos(),
        speed * sin_phi * theta.sin(),
        speed * cos_phi,
    )
}
