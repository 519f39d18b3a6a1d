//! Identifier types for agents and co-location groups.
//!
//! Agents carry a UUID v7 identity that is stable for their whole life.
//! Groups are different: a [`GroupId`] is a pure function of continuous
//! position and is recomputed whenever an agent moves, so it wraps a plain
//! integer instead of a UUID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an agent (player) in the universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    /// Create a new identifier using UUID v7 (time-ordered).
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for AgentId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for AgentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<AgentId> for Uuid {
    fn from(id: AgentId) -> Self {
        id.0
    }
}

/// Co-location group derived from a quantized continuous position.
///
/// Never stored as an independent source of truth; see
/// [`UniverseSettings::group_of`](crate::UniverseSettings::group_of).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GroupId(pub i64);

impl core::fmt::Display for GroupId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "group-{}", self.0)
    }
}
