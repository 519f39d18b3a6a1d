//! Agent motion between ticks.
//!
//! The universe asks a [`Motion`] model where each agent is next turn. The
//! model is a pure function of the record; the universe applies the result
//! (coordinate history, group, discrete position) through
//! [`AgentRecord::move_to`].

use lightcone_types::{AgentRecord, Double4D, UniverseSettings, Velocity};

/// Offset keeping clamped coordinates strictly inside the upper bound.
const EDGE: f64 = 1e-9;

/// A model of how agents move from one turn to the next.
pub trait Motion: Send + Sync {
    /// Position and velocity of `record` at `next_turn`.
    ///
    /// The returned position must lie inside the universe and its time
    /// component must equal `next_turn`.
    fn step(&self, record: &AgentRecord, next_turn: i32, settings: &UniverseSettings)
    -> (Double4D, Velocity);
}

/// Straight-line motion at constant velocity.
///
/// Velocity is clamped to the speed of light. An agent reaching a wall is
/// reflected back into the universe with the matching velocity component
/// reversed.
#[derive(Debug, Clone, Copy, Default)]
pub struct Inertial;

impl Motion for Inertial {
    fn step(
        &self,
        record: &AgentRecord,
        next_turn: i32,
        settings: &UniverseSettings,
    ) -> (Double4D, Velocity) {
        let v = record.velocity.clamped(settings.speed_of_light);
        let p = record.continuous;
        let (x, vx) = reflect(p.x + v.vx, v.vx, settings.x_dim);
        let (y, vy) = reflect(p.y + v.vy, v.vy, settings.y_dim);
        let (z, vz) = reflect(p.z + v.vz, v.vz, settings.z_dim);
        (
            Double4D::new(f64::from(next_turn), x, y, z),
            Velocity::new(vx, vy, vz),
        )
    }
}

/// Fold a coordinate back into `[0, dim)`, reversing the velocity on a hit.
fn reflect(next: f64, velocity: f64, dim: i32) -> (f64, f64) {
    let upper = f64::from(dim) - EDGE;
    if next < 0.0 {
        ((-next).clamp(0.0, upper), -velocity)
    } else if next > upper {
        (upper.mul_add(2.0, -next).clamp(0.0, upper), -velocity)
    } else {
        (next, velocity)
    }
}
