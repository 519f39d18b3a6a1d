//! Injected diagnostics sink.
//!
//! The view builder and the planning sandbox never halt on bad data. They
//! report what went wrong through a [`DiagnosticsSink`] handed to them at
//! construction, then substitute a safe default. [`TracingDiagnostics`]
//! forwards reports to `tracing`; [`CollectingDiagnostics`] keeps them for
//! inspection.

use std::sync::{Arc, Mutex, PoisonError};

use lightcone_types::AgentId;
use tracing::{error, warn};

use crate::error::WorldError;

/// A recoverable problem observed while building views or replaying plans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// A coordinate fell outside the universe; the query was treated as empty.
    Geometry(WorldError),

    /// An invariant did not hold; a safe default was substituted.
    Consistency {
        /// Which invariant was violated.
        context: String,
        /// The agent involved, if any.
        agent: Option<AgentId>,
    },
}

impl Diagnostic {
    /// Shorthand for a consistency violation.
    pub fn consistency(context: impl Into<String>, agent: Option<AgentId>) -> Self {
        Self::Consistency {
            context: context.into(),
            agent,
        }
    }
}

/// Receiver for [`Diagnostic`] reports.
pub trait DiagnosticsSink: Send + Sync {
    /// Record one diagnostic.
    fn report(&self, diagnostic: Diagnostic);
}

/// Sink that emits each diagnostic as a `tracing` event.
///
/// Geometry errors are logged at `warn`, consistency violations at `error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        match diagnostic {
            Diagnostic::Geometry(err) => warn!(%err, "Geometry error treated as empty"),
            Diagnostic::Consistency { context, agent } => {
                error!(%context, ?agent, "Consistency violation, substituting default");
            }
        }
    }
}

/// Sink that stores every diagnostic in memory.
#[derive(Debug, Default)]
pub struct CollectingDiagnostics {
    entries: Mutex<Vec<Diagnostic>>,
}

impl CollectingDiagnostics {
    /// Create an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything reported so far.
    pub fn entries(&self) -> Vec<Diagnostic> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of geometry diagnostics reported so far.
    pub fn geometry_count(&self) -> usize {
        self.entries()
            .iter()
            .filter(|d| matches!(d, Diagnostic::Geometry(_)))
            .count()
    }

    /// Number of consistency diagnostics reported so far.
    pub fn consistency_count(&self) -> usize {
        self.entries()
            .iter()
            .filter(|d| matches!(d, Diagnostic::Consistency { .. }))
            .count()
    }
}

impl DiagnosticsSink for CollectingDiagnostics {
    fn report(&self, diagnostic: Diagnostic) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(diagnostic);
    }
}

/// The default sink, shared.
pub fn tracing_sink() -> Arc<dyn DiagnosticsSink> {
    Arc::new(TracingDiagnostics)
}

#[cfg(test)]
mod tests {
    use lightcone_types::Int3D;

    use super::*;

    #[test]
    fn collector_counts_by_kind() {
        let sink = CollectingDiagnostics::new();
        sink.report(Diagnostic::Geometry(WorldError::OutOfBounds {
            cell: Int3D::new(9, 0, 0),
            dims: Int3D::new(4, 4, 4),
        }));
        sink.report(Diagnostic::consistency("missing record", None));
        sink.report(Diagnostic::consistency("empty group", None));
        assert_eq!(sink.geometry_count(), 1);
        assert_eq!(sink.consistency_count(), 2);
        assert_eq!(sink.entries().len(), 3);
    }

    #[test]
    fn tracing_sink_accepts_reports() {
        let sink = tracing_sink();
        sink.report(Diagnostic::consistency("smoke", Some(AgentId::new())));
    }
}
