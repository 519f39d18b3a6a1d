//! Shared type definitions for the Lightcone simulation.
//!
//! This crate is the single source of truth for data shared across the
//! workspace. It holds no simulation logic beyond derived-field upkeep on
//! agent records.
//!
//! # Modules
//!
//! - [`ids`] -- Agent identity and co-location group ids
//! - [`coords`] -- Discrete and continuous spacetime coordinates, velocity
//! - [`record`] -- Agent snapshot records in shared and owned form
//! - [`settings`] -- Universe parameters and group quantization
//! - [`command`] -- Command validation results

pub mod command;
pub mod coords;
pub mod ids;
pub mod record;
pub mod settings;

// Re-export all public types at crate root for convenience.
pub use command::{CommandErrorMessage, LocalizableString, NamedCheck};
pub use coords::{Double2D, Double3D, Double4D, Int3D, Int4D, Velocity};
pub use ids::{AgentId, GroupId};
pub use record::{AgentRecord, Hierarchy, InternalData, SharedRecord};
pub use settings::UniverseSettings;
