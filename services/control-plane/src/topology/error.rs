//! Topology planning errors.

use thiserror::Error;

use super::VmType;
use crate::db::StoreError;

/// Errors raised while planning or materializing a topology.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// The sizing table has no rows for the requested scale.
    #[error("no sizing tier defined for scale {scale} (known tiers: {known:?})")]
    UnknownScaleTier { scale: u32, known: Vec<u32> },

    /// Every address of the zone's pool is already assigned.
    #[error("IP pool of zone '{zone}' is exhausted ({pool})")]
    PoolExhausted { zone: String, pool: String },

    /// A tier is mapped to a zone that has not been created.
    #[error("zone '{zone}' required by {vm_type} does not exist")]
    ZoneMissing { zone: String, vm_type: VmType },

    /// The zone has no usable pool bounds.
    #[error("zone '{zone}' has no usable IP pool: {reason}")]
    PoolNotConfigured { zone: String, reason: String },

    /// A sizing row breaks a tier invariant.
    #[error("invalid sizing row {vm_type} at scale {scale}: {reason}")]
    InvalidSizing {
        scale: u32,
        vm_type: VmType,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
