//! Speculative planning over observer views.
//!
//! An observer composes a plan by queuing [`Command`]s in a [`PlanSandbox`].
//! The sandbox applies them to private copies of agent records, never to the
//! shared view, and can drop any queued command by resetting and replaying.
//!
//! # Modules
//!
//! - [`command`] -- The [`Command`] capability and [`SharedCommand`] handle
//! - [`sandbox`] -- [`PlanSandbox`], the per-observer overlay and queue

pub mod command;
pub mod sandbox;

pub use command::{Command, SharedCommand, same_command};
pub use sandbox::{OnChange, PlanSandbox};
