//! Light-delayed views of the Lightcone universe.
//!
//! This crate turns the authoritative per-tick history into what each
//! observer can causally know: one grid view per center cell, then one view
//! per group of co-located observers.
//!
//! # Modules
//!
//! - [`geometry`] -- Distance, light delay, and bounds checks
//! - [`spatial`] -- Copy-on-write cell -> group -> ids index
//! - [`history`] -- [`HistoryBuffer`] trait and the [`RingHistory`] store
//! - [`grid_view`] -- [`GridView`] and [`ViewBuilder::build_grid_view`]
//! - [`observer`] -- [`ObserverView`] and [`ViewBuilder::derive_observer_views`]
//! - [`diagnostics`] -- Injected [`DiagnosticsSink`] for recoverable problems
//! - [`error`] -- [`WorldError`]

pub mod diagnostics;
pub mod error;
pub mod geometry;
pub mod grid_view;
pub mod history;
pub mod observer;
pub mod spatial;

pub use diagnostics::{
    CollectingDiagnostics, Diagnostic, DiagnosticsSink, TracingDiagnostics, tracing_sink,
};
pub use error::WorldError;
pub use geometry::{Distance, cell_index, delay, distance, max_delay};
pub use grid_view::{GridView, ViewBuilder};
pub use history::{CellRecords, HistoryBuffer, RecordCopies, RingHistory, Snapshot};
pub use observer::ObserverView;
pub use spatial::{GroupMap, GroupMembers, SpatialIndex};
