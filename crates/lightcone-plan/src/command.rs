//! The command capability the sandbox depends on.
//!
//! Concrete command kinds live with their callers. The sandbox only ever
//! sees `Arc<dyn Command>` and identifies queue entries by pointer, so two
//! structurally equal commands queued separately are distinct entries.

use std::fmt::Debug;
use std::sync::Arc;

use lightcone_types::{AgentId, AgentRecord, CommandErrorMessage, Int4D, UniverseSettings};

/// An action one agent (the observer) plans against another (the target).
///
/// Execution is two-phase. [`self_check_and_execute`] validates against and
/// mutates the observer's own record; only if it succeeds is the command
/// queued. [`check_and_execute`] then validates against and mutates the
/// target's record. Both phases report through [`CommandErrorMessage`]
/// rather than `Err`.
///
/// Implementations must be deterministic: replaying the same commands from
/// the same records must produce the same records.
///
/// [`self_check_and_execute`]: Command::self_check_and_execute
/// [`check_and_execute`]: Command::check_and_execute
pub trait Command: Debug + Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// The agent this command acts on.
    fn target_id(&self) -> AgentId;

    /// Validate against and apply to the issuing observer's record.
    ///
    /// On failure the caller discards any changes made to `observer`.
    fn self_check_and_execute(
        &self,
        observer: &mut AgentRecord,
        settings: &UniverseSettings,
    ) -> CommandErrorMessage;

    /// Validate against and apply to the target's record.
    ///
    /// `from` and `from_coordinate` identify the issuing observer and where
    /// it stood when it formed its plan.
    fn check_and_execute(
        &self,
        target: &mut AgentRecord,
        from: AgentId,
        from_coordinate: Int4D,
        settings: &UniverseSettings,
    ) -> CommandErrorMessage;
}

/// Shared handle to a queued command. Queue identity is pointer identity.
pub type SharedCommand = Arc<dyn Command>;

/// Whether two handles refer to the same queued command.
pub fn same_command(a: &SharedCommand, b: &SharedCommand) -> bool {
    Arc::ptr_eq(a, b)
}
