//! Stratum control plane library.
//!
//! This crate primarily ships the `stratum-control-plane` binary, but exposes
//! its components as a library for integration testing and reuse.
//!
//! - [`topology`]: scale-driven VM planning and materialization
//! - [`ipam`]: per-zone address allocation
//! - [`deploy`]: the unit registry, engine adapters and deployment sequencer
//! - [`db`]: SQLite-backed inventory and run state

pub mod api;
pub mod config;
pub mod db;
pub mod deploy;
pub mod ipam;
pub mod state;
pub mod topology;
