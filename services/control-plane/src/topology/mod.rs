//! Topology planning.
//!
//! Expands a scale parameter (target concurrent users) into the fixed
//! multi-tier VM set, allocates addresses from per-zone pools and keeps the
//! derived DNS and flow records in step with the persisted inventory.
//!
//! - [`sizing`]: the static `(scale, vm type)` sizing table
//! - [`planner`]: pure expansion into [`VmSpec`]s and hostname generation
//! - [`apply`]: transactional materialization and VM reconciliation
//! - [`derived`]: DNS and flow record derivation

mod apply;
pub mod derived;
mod error;
pub mod planner;
pub mod sizing;
mod tier;

pub use apply::{MaterializeReport, Topology};
pub use error::TopologyError;
pub use planner::{generate_hostname, Planner, VmSpec};
pub use sizing::{SizingTable, TierSizing};
pub use tier::{zones, Cluster, VmType, STORAGE_ROLE};
