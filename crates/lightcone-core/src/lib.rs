//! Configuration, motion, and the authoritative universe for Lightcone.
//!
//! This crate drives the per-tick cycle: record state into history, build
//! observer views, commit plans, and move agents forward one turn.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `lightcone-config.yaml` into
//!   strongly-typed structs.
//! - [`motion`] -- [`Motion`] trait and the [`Inertial`] model.
//! - [`universe`] -- [`Universe`], the in-memory authoritative store.
//!
//! [`Motion`]: motion::Motion
//! [`Inertial`]: motion::Inertial
//! [`Universe`]: universe::Universe

pub mod config;
pub mod motion;
pub mod universe;
