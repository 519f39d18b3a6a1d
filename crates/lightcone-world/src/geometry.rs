//! Euclidean distance, light delay, and grid bounds.
//!
//! Everything here is a pure function of its arguments.

use lightcone_types::{Double2D, Double3D, Double4D, Int3D, Int4D, UniverseSettings};

use crate::error::WorldError;

/// Euclidean distance between two positions of the same kind.
///
/// For 4D coordinates the distance is spatial; the time component is ignored.
pub trait Distance {
    /// Distance from `self` to `other`.
    fn distance(&self, other: &Self) -> f64;
}

fn norm3(dx: f64, dy: f64, dz: f64) -> f64 {
    dz.mul_add(dz, dx.mul_add(dx, dy * dy)).sqrt()
}

impl Distance for Double2D {
    fn distance(&self, other: &Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

impl Distance for Double3D {
    fn distance(&self, other: &Self) -> f64 {
        norm3(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl Distance for Double4D {
    fn distance(&self, other: &Self) -> f64 {
        self.to_double3d().distance(&other.to_double3d())
    }
}

impl Distance for Int3D {
    fn distance(&self, other: &Self) -> f64 {
        self.to_double3d().distance(&other.to_double3d())
    }
}

impl Distance for Int4D {
    fn distance(&self, other: &Self) -> f64 {
        self.to_int3d().distance(&other.to_int3d())
    }
}

/// Free-function form of [`Distance::distance`].
pub fn distance<T: Distance>(a: &T, b: &T) -> f64 {
    a.distance(b)
}

/// Turns light needs to cross from `origin` to `target`.
///
/// Rounded up, so a record is never visible before it could causally arrive.
/// `delay(o, o, c) == 0` and the result is non-decreasing in distance.
pub fn delay(origin: Int3D, target: Int3D, speed_of_light: f64) -> i32 {
    turns_for(origin.distance(&target), speed_of_light)
}

/// Turns light needs to cover `distance`.
///
/// A speed of light that is not a positive finite number never delivers
/// anything at a distance: the result is `i32::MAX`.
#[allow(clippy::cast_possible_truncation)]
pub fn turns_for(distance: f64, speed_of_light: f64) -> i32 {
    if distance <= 0.0 {
        return 0;
    }
    if !speed_of_light.is_finite() || speed_of_light <= 0.0 {
        return i32::MAX;
    }
    let turns = (distance / speed_of_light).ceil();
    if turns >= f64::from(i32::MAX) {
        i32::MAX
    } else {
        turns as i32
    }
}

/// The longest delay between any two cells of the universe.
pub fn max_delay(settings: &UniverseSettings) -> i32 {
    let far = Int3D::new(
        settings.x_dim.saturating_sub(1),
        settings.y_dim.saturating_sub(1),
        settings.z_dim.saturating_sub(1),
    );
    delay(Int3D::default(), far, settings.speed_of_light)
}

/// Validate a cell against the universe bounds.
///
/// # Errors
///
/// Returns [`WorldError::OutOfBounds`] if any component is negative or not
/// less than the matching dimension.
pub const fn check_bounds(cell: Int3D, settings: &UniverseSettings) -> Result<(), WorldError> {
    if settings.contains(cell) {
        Ok(())
    } else {
        Err(WorldError::OutOfBounds {
            cell,
            dims: settings.dims(),
        })
    }
}

/// Flat x-major index of a cell: `(x * y_dim + y) * z_dim + z`.
///
/// # Errors
///
/// Returns [`WorldError::OutOfBounds`] for cells outside the universe.
#[allow(clippy::cast_sign_loss)]
pub fn cell_index(cell: Int3D, settings: &UniverseSettings) -> Result<usize, WorldError> {
    check_bounds(cell, settings)?;
    // In-bounds components are non-negative and below their dimension.
    let (x, y, z) = (cell.x as usize, cell.y as usize, cell.z as usize);
    let (ny, nz) = (settings.y_dim as usize, settings.z_dim as usize);
    Ok(x.saturating_mul(ny).saturating_add(y).saturating_mul(nz).saturating_add(z))
}

/// Iterate every cell of the universe in x-major order.
pub fn cells(settings: &UniverseSettings) -> impl Iterator<Item = Int3D> + use<> {
    let (nx, ny, nz) = (settings.x_dim, settings.y_dim, settings.z_dim);
    (0..nx).flat_map(move |x| (0..ny).flat_map(move |y| (0..nz).map(move |z| Int3D::new(x, y, z))))
}
