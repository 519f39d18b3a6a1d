//! Error types for the `lightcone-world` crate.
//!
//! Geometry errors are recoverable by design of the view builder: callers
//! report them through a [`DiagnosticsSink`](crate::DiagnosticsSink) and
//! treat the affected query as empty.

use lightcone_types::{AgentId, Int3D, Int4D};

/// Errors that can occur during spacetime history and view operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorldError {
    /// A cell lies outside the universe bounds.
    #[error("cell {cell} is outside universe bounds {dims}")]
    OutOfBounds {
        /// The rejected cell.
        cell: Int3D,
        /// Universe dimensions.
        dims: Int3D,
    },

    /// The history buffer holds no snapshot for the requested turn.
    #[error("turn {time} is not retained in history (retained: {oldest}..={newest})")]
    TimeNotRetained {
        /// Requested turn.
        time: i32,
        /// Oldest retained turn.
        oldest: i32,
        /// Newest retained turn.
        newest: i32,
    },

    /// The history buffer is empty.
    #[error("history buffer is empty")]
    EmptyHistory,

    /// A tick was pushed out of order.
    #[error("tick {got} pushed out of order (expected {expected})")]
    NonSequentialTick {
        /// The turn that should have been pushed next.
        expected: i32,
        /// The turn that was pushed.
        got: i32,
    },

    /// A record's own turn disagrees with the tick it was pushed in.
    #[error("record for {agent} is stamped {record} but was pushed at {tick}")]
    RecordTimeMismatch {
        /// The agent.
        agent: AgentId,
        /// The record's position.
        record: Int4D,
        /// The tick being pushed.
        tick: i32,
    },

    /// The same agent was pushed twice in one tick.
    #[error("agent {0} appears more than once in a single tick")]
    DuplicateRecord(AgentId),
}
