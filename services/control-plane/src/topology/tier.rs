//! Machine tiers and their fixed placement rules.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Storage capability tag. Only VMs carrying it get a data disk.
pub const STORAGE_ROLE: &str = "cns";

/// Zone names every deployment defines.
pub mod zones {
    pub const APPS: &str = "apps";
    pub const INFRA: &str = "infra";
    pub const DMZ: &str = "dmz";

    /// Materialization order.
    pub const ALL: [&str; 3] = [APPS, INFRA, DMZ];
}

/// A named class of machines sharing role tags and a sizing profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VmType {
    RkeappsControl,
    RkeappsCns,
    RkeappsWorker,
    RkemiddlewareControl,
    RkemiddlewareCns,
    RkemiddlewareWorker,
    Rkedmz,
    Lblan,
    Lbdmz,
    Lbintegration,
    Gitops,
    Monitoring,
    Vault,
}

/// Kubernetes cluster a tier belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cluster {
    Apps,
    Middleware,
    Dmz,
}

impl VmType {
    pub const ALL: [VmType; 13] = [
        VmType::RkeappsControl,
        VmType::RkeappsCns,
        VmType::RkeappsWorker,
        VmType::RkemiddlewareControl,
        VmType::RkemiddlewareCns,
        VmType::RkemiddlewareWorker,
        VmType::Rkedmz,
        VmType::Lblan,
        VmType::Lbdmz,
        VmType::Lbintegration,
        VmType::Gitops,
        VmType::Monitoring,
        VmType::Vault,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RkeappsControl => "RKEAPPS_CONTROL",
            Self::RkeappsCns => "RKEAPPS_CNS",
            Self::RkeappsWorker => "RKEAPPS_WORKER",
            Self::RkemiddlewareControl => "RKEMIDDLEWARE_CONTROL",
            Self::RkemiddlewareCns => "RKEMIDDLEWARE_CNS",
            Self::RkemiddlewareWorker => "RKEMIDDLEWARE_WORKER",
            Self::Rkedmz => "RKEDMZ",
            Self::Lblan => "LBLAN",
            Self::Lbdmz => "LBDMZ",
            Self::Lbintegration => "LBINTEGRATION",
            Self::Gitops => "GITOPS",
            Self::Monitoring => "MONITORING",
            Self::Vault => "VAULT",
        }
    }

    /// Hostname stem before the environment prefix and index are applied.
    pub fn hostname_prefix(&self) -> &'static str {
        match self {
            Self::RkeappsControl => "rkeapp-master",
            Self::RkeappsCns => "rkeapp-cns",
            Self::RkeappsWorker => "rkeapp-worker",
            Self::RkemiddlewareControl => "rkemiddleware-master",
            Self::RkemiddlewareCns => "rkemiddleware-cns",
            Self::RkemiddlewareWorker => "rkemiddleware-worker",
            Self::Rkedmz => "rkedmz",
            Self::Lblan => "lblan",
            Self::Lbdmz => "lbdmz",
            Self::Lbintegration => "lbintegration",
            Self::Gitops => "gitops",
            Self::Monitoring => "monitoring",
            Self::Vault => "vault",
        }
    }

    /// Zone every VM of this tier is placed in.
    pub fn zone(&self) -> &'static str {
        match self {
            Self::RkeappsControl | Self::RkeappsCns | Self::RkeappsWorker => zones::APPS,
            Self::Rkedmz | Self::Lbdmz => zones::DMZ,
            Self::RkemiddlewareControl
            | Self::RkemiddlewareCns
            | Self::RkemiddlewareWorker
            | Self::Lblan
            | Self::Lbintegration
            | Self::Gitops
            | Self::Monitoring
            | Self::Vault => zones::INFRA,
        }
    }

    pub fn cluster(&self) -> Option<Cluster> {
        match self {
            Self::RkeappsControl | Self::RkeappsCns | Self::RkeappsWorker => Some(Cluster::Apps),
            Self::RkemiddlewareControl | Self::RkemiddlewareCns | Self::RkemiddlewareWorker => {
                Some(Cluster::Middleware)
            }
            Self::Rkedmz => Some(Cluster::Dmz),
            _ => None,
        }
    }

    pub fn is_control_plane(&self) -> bool {
        matches!(self, Self::RkeappsControl | Self::RkemiddlewareControl)
    }

    pub fn is_load_balancer(&self) -> bool {
        matches!(self, Self::Lblan | Self::Lbdmz | Self::Lbintegration)
    }

    pub fn is_dmz(&self) -> bool {
        matches!(self, Self::Rkedmz)
    }

    /// Node count this tier is pinned to, if any.
    pub fn fixed_node_count(&self) -> Option<u32> {
        if self.is_control_plane() || self.is_dmz() {
            Some(3)
        } else if self.is_load_balancer() {
            Some(2)
        } else {
            None
        }
    }
}

impl fmt::Display for VmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VmType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown vm type: {s}"))
    }
}

impl Cluster {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Apps => "apps",
            Self::Middleware => "middleware",
            Self::Dmz => "dmz",
        }
    }

    /// Tier running the cluster's control plane.
    pub fn control_plane(&self) -> VmType {
        match self {
            Self::Apps => VmType::RkeappsControl,
            Self::Middleware => VmType::RkemiddlewareControl,
            Self::Dmz => VmType::Rkedmz,
        }
    }

    /// Tiers joining the cluster as agents.
    pub fn agents(&self) -> &'static [VmType] {
        match self {
            Self::Apps => &[VmType::RkeappsCns, VmType::RkeappsWorker],
            Self::Middleware => &[VmType::RkemiddlewareCns, VmType::RkemiddlewareWorker],
            Self::Dmz => &[],
        }
    }

    /// Load-balancer tier fronting this cluster.
    pub fn load_balancer(&self) -> VmType {
        match self {
            Self::Apps => VmType::Lblan,
            Self::Middleware => VmType::Lbintegration,
            Self::Dmz => VmType::Lbdmz,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_type_parse_round_trip() {
        for vm_type in VmType::ALL {
            assert_eq!(vm_type.as_str().parse::<VmType>().unwrap(), vm_type);
        }
        assert_eq!("lblan".parse::<VmType>().unwrap(), VmType::Lblan);
        assert!("BASTION".parse::<VmType>().is_err());
    }

    #[test]
    fn test_serde_matches_as_str() {
        for vm_type in VmType::ALL {
            let json = serde_json::to_string(&vm_type).unwrap();
            assert_eq!(json, format!("\"{}\"", vm_type.as_str()));
        }
    }

    #[test]
    fn test_zone_placement() {
        assert_eq!(VmType::RkeappsWorker.zone(), zones::APPS);
        assert_eq!(VmType::Lbdmz.zone(), zones::DMZ);
        assert_eq!(VmType::Rkedmz.zone(), zones::DMZ);
        assert_eq!(VmType::Vault.zone(), zones::INFRA);
        assert_eq!(VmType::Lblan.zone(), zones::INFRA);
    }

    #[test]
    fn test_fixed_counts() {
        assert_eq!(VmType::RkeappsControl.fixed_node_count(), Some(3));
        assert_eq!(VmType::Rkedmz.fixed_node_count(), Some(3));
        assert_eq!(VmType::Lbintegration.fixed_node_count(), Some(2));
        assert_eq!(VmType::RkeappsWorker.fixed_node_count(), None);
    }
}
