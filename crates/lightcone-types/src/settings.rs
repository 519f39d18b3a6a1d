//! Read-only universe parameters shared by every component.
//!
//! [`UniverseSettings`] is deserialized from the `universe` section of
//! `lightcone-config.yaml`. All fields have defaults so a partial config
//! file is valid. Range validation lives in `lightcone-core::config`.

use serde::{Deserialize, Serialize};

use crate::coords::{Double3D, Int3D};
use crate::ids::GroupId;

/// Universe-wide simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseSettings {
    /// Number of cells along the X axis.
    #[serde(default = "default_dim")]
    pub x_dim: i32,

    /// Number of cells along the Y axis.
    #[serde(default = "default_dim")]
    pub y_dim: i32,

    /// Number of cells along the Z axis.
    #[serde(default = "default_dim")]
    pub z_dim: i32,

    /// Cells travelled by light per turn.
    #[serde(default = "default_speed_of_light")]
    pub speed_of_light: f64,

    /// Edge length of the cube used to quantize continuous positions into
    /// co-location groups.
    #[serde(default = "default_group_edge_length")]
    pub group_edge_length: f64,

    /// Turns an afterimage stays at a cell after its agent has left.
    #[serde(default = "default_afterimage_duration")]
    pub afterimage_duration: i32,

    /// Turns of coordinate history retained on each agent record.
    #[serde(default = "default_coordinate_history_length")]
    pub coordinate_history_length: i32,
}

impl Default for UniverseSettings {
    fn default() -> Self {
        Self {
            x_dim: default_dim(),
            y_dim: default_dim(),
            z_dim: default_dim(),
            speed_of_light: default_speed_of_light(),
            group_edge_length: default_group_edge_length(),
            afterimage_duration: default_afterimage_duration(),
            coordinate_history_length: default_coordinate_history_length(),
        }
    }
}

const fn default_dim() -> i32 {
    8
}

const fn default_speed_of_light() -> f64 {
    1.0
}

const fn default_group_edge_length() -> f64 {
    1.0
}

const fn default_afterimage_duration() -> i32 {
    2
}

const fn default_coordinate_history_length() -> i32 {
    4
}

impl UniverseSettings {
    /// Settings for a cubic universe with the given edge and speed of light.
    /// Remaining fields take their defaults.
    pub fn cube(dim: i32, speed_of_light: f64) -> Self {
        Self {
            x_dim: dim,
            y_dim: dim,
            z_dim: dim,
            speed_of_light,
            ..Self::default()
        }
    }

    /// Grid dimensions as a cell.
    pub const fn dims(&self) -> Int3D {
        Int3D::new(self.x_dim, self.y_dim, self.z_dim)
    }

    /// Whether a cell lies inside the universe bounds.
    pub const fn contains(&self, cell: Int3D) -> bool {
        cell.x >= 0
            && cell.y >= 0
            && cell.z >= 0
            && cell.x < self.x_dim
            && cell.y < self.y_dim
            && cell.z < self.z_dim
    }

    /// Total number of cells in the grid.
    pub fn cell_count(&self) -> usize {
        let count = i64::from(self.x_dim.max(0))
            .saturating_mul(i64::from(self.y_dim.max(0)))
            .saturating_mul(i64::from(self.z_dim.max(0)));
        usize::try_from(count).unwrap_or(0)
    }

    /// The co-location group containing a continuous position.
    ///
    /// Two positions share a group exactly when they fall into the same
    /// quantization cube of edge [`group_edge_length`](Self::group_edge_length).
    #[allow(clippy::cast_possible_truncation)]
    pub fn group_of(&self, position: Double3D) -> GroupId {
        let edge = self.group_edge_length;
        let gx = (position.x / edge).floor() as i64;
        let gy = (position.y / edge).floor() as i64;
        let gz = (position.z / edge).floor() as i64;
        let nx = self.groups_along(self.x_dim);
        let ny = self.groups_along(self.y_dim);
        GroupId(gx.saturating_add(nx.saturating_mul(gy.saturating_add(ny.saturating_mul(gz)))))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn groups_along(&self, dim: i32) -> i64 {
        let n = (f64::from(dim) / self.group_edge_length).ceil() as i64;
        n.max(1)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = UniverseSettings::default();
        assert_eq!(s.dims(), Int3D::new(8, 8, 8));
        assert_eq!(s.cell_count(), 512);
        assert!(s.speed_of_light > 0.0);
    }

    #[test]
    fn contains_rejects_edges() {
        let s = UniverseSettings::cube(4, 1.0);
        assert!(s.contains(Int3D::new(0, 0, 0)));
        assert!(s.contains(Int3D::new(3, 3, 3)));
        assert!(!s.contains(Int3D::new(4, 0, 0)));
        assert!(!s.contains(Int3D::new(0, -1, 0)));
    }

    #[test]
    fn same_cube_shares_group() {
        let s = UniverseSettings::cube(4, 1.0);
        let a = s.group_of(Double3D::new(1.1, 1.1, 1.1));
        let b = s.group_of(Double3D::new(1.9, 1.9, 1.9));
        let c = s.group_of(Double3D::new(2.1, 1.1, 1.1));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn larger_edge_merges_neighbouring_cells() {
        let s = UniverseSettings {
            group_edge_length: 2.0,
            ..UniverseSettings::cube(4, 1.0)
        };
        assert_eq!(
            s.group_of(Double3D::new(0.5, 0.5, 0.5)),
            s.group_of(Double3D::new(1.5, 1.5, 1.5))
        );
        assert_ne!(
            s.group_of(Double3D::new(1.5, 0.5, 0.5)),
            s.group_of(Double3D::new(2.5, 0.5, 0.5))
        );
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let parsed: Result<UniverseSettings, _> =
            serde_json::from_str(r#"{"x_dim": 16, "speed_of_light": 2.0}"#);
        assert!(parsed.is_ok());
        let s = parsed.unwrap_or_default();
        assert_eq!(s.x_dim, 16);
        assert_eq!(s.y_dim, 8);
        assert!((s.speed_of_light - 2.0).abs() < f64::EPSILON);
    }

    proptest! {
        #[test]
        fn distinct_cubes_get_distinct_groups(
            a in (0.0f64..8.0, 0.0f64..8.0, 0.0f64..8.0),
            b in (0.0f64..8.0, 0.0f64..8.0, 0.0f64..8.0),
        ) {
            let s = UniverseSettings::default();
            let pa = Double3D::new(a.0, a.1, a.2);
            let pb = Double3D::new(b.0, b.1, b.2);
            let same_cube = pa.to_int3d() == pb.to_int3d();
            prop_assert_eq!(s.group_of(pa) == s.group_of(pb), same_cube);
        }
    }
}
