//! Per-agent snapshot records.
//!
//! An [`AgentRecord`] is the full state of one agent at one turn. The same
//! struct serves both forms the simulation needs:
//!
//! - read-only: `Arc<AgentRecord>` ([`SharedRecord`]), held by the history
//!   buffer and by every view built from it;
//! - mutable-owned: a plain `AgentRecord`, held by exactly one owner (the
//!   authoritative store, or a planning sandbox that deep-copied it).
//!
//! Mutation helpers here are pure data updates. They keep the discrete
//! position and group id derived from the continuous position.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::coords::{Double4D, Int3D, Int4D, Velocity};
use crate::ids::{AgentId, GroupId};
use crate::settings::UniverseSettings;

/// Shared, read-only handle to a record.
pub type SharedRecord = Arc<AgentRecord>;

/// Opaque domain payload (economy, population, diplomacy, ...).
///
/// Components in this workspace never interpret it; commands do.
pub type InternalData = serde_json::Map<String, serde_json::Value>;

/// Leadership relations between agents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hierarchy {
    /// Direct leader, if any.
    pub leader: Option<AgentId>,
    /// Agents that name this agent as their direct leader.
    pub direct_subordinates: BTreeSet<AgentId>,
    /// Every agent below this one in the hierarchy, at any depth.
    pub all_subordinates: BTreeSet<AgentId>,
}

/// State of one agent at one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Agent identity.
    pub id: AgentId,
    /// Discrete spacetime cell. `position.t` is the turn this record describes.
    pub position: Int4D,
    /// Continuous spacetime position. Authoritative for `position` and `group`.
    pub continuous: Double4D,
    /// Current velocity.
    pub velocity: Velocity,
    /// Co-location group derived from `continuous`.
    pub group: GroupId,
    /// Past discrete cells, oldest first, one entry per cell change.
    pub coordinate_history: Vec<Int4D>,
    /// Leadership relations.
    pub hierarchy: Hierarchy,
    /// Opaque domain payload.
    pub internal: InternalData,
}

impl AgentRecord {
    /// Create a record at a continuous position.
    ///
    /// The discrete position and group are derived from `continuous`.
    pub fn new(id: AgentId, continuous: Double4D, settings: &UniverseSettings) -> Self {
        Self {
            id,
            position: continuous.to_int4d(),
            continuous,
            velocity: Velocity::default(),
            group: settings.group_of(continuous.to_double3d()),
            coordinate_history: Vec::new(),
            hierarchy: Hierarchy::default(),
            internal: InternalData::new(),
        }
    }

    /// Stand-in record used when an expected record is missing.
    ///
    /// Positioned at the origin of turn `t` with an empty payload.
    pub fn placeholder(id: AgentId, t: i32, settings: &UniverseSettings) -> Self {
        Self::new(id, Double4D::new(f64::from(t), 0.0, 0.0, 0.0), settings)
    }

    /// Builder-style payload setter.
    #[must_use]
    pub fn with_internal(mut self, key: &str, value: serde_json::Value) -> Self {
        self.internal.insert(String::from(key), value);
        self
    }

    /// Builder-style velocity setter.
    #[must_use]
    pub fn with_velocity(mut self, velocity: Velocity) -> Self {
        self.velocity = velocity;
        self
    }

    /// The turn this record describes.
    pub const fn time(&self) -> i32 {
        self.position.t
    }

    /// The spatial cell this record occupies.
    pub const fn cell(&self) -> Int3D {
        self.position.to_int3d()
    }

    /// Whether this record is an afterimage when viewed at turn `now`.
    pub const fn is_afterimage_at(&self, now: i32) -> bool {
        self.position.t != now
    }

    /// Move to a new continuous position.
    ///
    /// Re-derives the discrete position and group. When the discrete cell
    /// changes, the previous cell is appended to the coordinate history and
    /// the history is trimmed to the retention window.
    pub fn move_to(&mut self, continuous: Double4D, settings: &UniverseSettings) {
        let previous = self.position;
        self.continuous = continuous;
        self.position = continuous.to_int4d();
        self.recompute_group(settings);
        if previous.to_int3d() != self.position.to_int3d() {
            self.record_history(previous, settings);
        }
    }

    /// Replace the velocity.
    pub fn set_velocity(&mut self, velocity: Velocity) {
        self.velocity = velocity;
    }

    /// Re-derive `group` from the continuous position.
    pub fn recompute_group(&mut self, settings: &UniverseSettings) {
        self.group = settings.group_of(self.continuous.to_double3d());
    }

    /// Append a past coordinate and drop entries older than
    /// `coordinate_history_length` turns before the record's own turn.
    pub fn record_history(&mut self, coordinate: Int4D, settings: &UniverseSettings) {
        self.coordinate_history.push(coordinate);
        self.trim_history(settings);
    }

    /// Drop history entries that fell out of the retention window.
    pub fn trim_history(&mut self, settings: &UniverseSettings) {
        let cutoff = self
            .position
            .t
            .saturating_sub(settings.coordinate_history_length);
        self.coordinate_history.retain(|c| c.t >= cutoff);
    }

    /// Read an integer field from the payload.
    pub fn internal_i64(&self, key: &str) -> Option<i64> {
        self.internal.get(key).and_then(serde_json::Value::as_i64)
    }
}
