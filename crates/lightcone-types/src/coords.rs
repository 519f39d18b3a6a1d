//! Discrete and continuous coordinates in 4D spacetime.
//!
//! Discrete cells (`Int3D`, `Int4D`) index the universe grid and the history
//! buffer. Continuous positions (`Double3D`, `Double4D`) are authoritative for
//! group assignment; a discrete position is always the floor of its
//! continuous counterpart.

use serde::{Deserialize, Serialize};

/// A discrete spatial cell.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Int3D {
    /// X cell index.
    pub x: i32,
    /// Y cell index.
    pub y: i32,
    /// Z cell index.
    pub z: i32,
}

impl Int3D {
    /// Construct a cell from its components.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Attach a time component, producing a spacetime cell.
    pub const fn at_time(self, t: i32) -> Int4D {
        Int4D {
            t,
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    /// The continuous position of this cell's lower corner.
    pub fn to_double3d(self) -> Double3D {
        Double3D::new(f64::from(self.x), f64::from(self.y), f64::from(self.z))
    }
}

impl core::fmt::Display for Int3D {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A discrete spacetime cell: a turn number plus a spatial cell.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Int4D {
    /// Turn number.
    pub t: i32,
    /// X cell index.
    pub x: i32,
    /// Y cell index.
    pub y: i32,
    /// Z cell index.
    pub z: i32,
}

impl Int4D {
    /// Construct a spacetime cell from its components.
    pub const fn new(t: i32, x: i32, y: i32, z: i32) -> Self {
        Self { t, x, y, z }
    }

    /// Drop the time component.
    pub const fn to_int3d(self) -> Int3D {
        Int3D {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    /// Same spatial cell at a different turn.
    pub const fn with_time(self, t: i32) -> Self {
        Self { t, ..self }
    }
}

impl core::fmt::Display for Int4D {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "(t={}, {}, {}, {})", self.t, self.x, self.y, self.z)
    }
}

/// A continuous planar position. Used for 2D distance queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Double2D {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
}

impl Double2D {
    /// Construct a planar position.
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A continuous spatial position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Double3D {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Double3D {
    /// Construct a spatial position.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// The discrete cell containing this position (component-wise floor).
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_int3d(self) -> Int3D {
        Int3D {
            x: self.x.floor() as i32,
            y: self.y.floor() as i32,
            z: self.z.floor() as i32,
        }
    }

    /// Attach a time component.
    pub const fn at_time(self, t: f64) -> Double4D {
        Double4D {
            t,
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    /// Component-wise sum with a displacement.
    pub fn offset(self, dx: f64, dy: f64, dz: f64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }
}

/// A continuous spacetime position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Double4D {
    /// Time component, in turns.
    pub t: f64,
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Double4D {
    /// Construct a spacetime position.
    pub const fn new(t: f64, x: f64, y: f64, z: f64) -> Self {
        Self { t, x, y, z }
    }

    /// Drop the time component.
    pub const fn to_double3d(self) -> Double3D {
        Double3D {
            x: self.x,
            y: self.y,
            z: self.z,
        }
    }

    /// The discrete spacetime cell containing this position.
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_int4d(self) -> Int4D {
        self.to_double3d().to_int3d().at_time(self.t.floor() as i32)
    }
}

/// Velocity in cells per turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Velocity {
    /// X component.
    pub vx: f64,
    /// Y component.
    pub vy: f64,
    /// Z component.
    pub vz: f64,
}

impl Velocity {
    /// Construct a velocity.
    pub const fn new(vx: f64, vy: f64, vz: f64) -> Self {
        Self { vx, vy, vz }
    }

    /// Speed (Euclidean norm).
    pub fn magnitude(self) -> f64 {
        self.vz.mul_add(self.vz, self.vx.mul_add(self.vx, self.vy * self.vy)).sqrt()
    }

    /// Rescale so the speed does not exceed `limit`. Direction is preserved.
    pub fn clamped(self, limit: f64) -> Self {
        let speed = self.magnitude();
        if speed <= limit || speed <= 0.0 {
            return self;
        }
        let scale = limit / speed;
        Self {
            vx: self.vx * scale,
            vy: self.vy * scale,
            vz: self.vz * scale,
        }
    }
}
