//! Static sizing table: `(scale tier, vm type)` to node count and shape.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::tier::{VmType, STORAGE_ROLE};
use super::TopologyError;

/// One sizing-table row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierSizing {
    /// Target concurrent-user count this row belongs to.
    pub scale_tier: u32,
    pub vm_type: VmType,
    pub node_count: u32,
    pub cpu_per_node: u32,
    /// MiB.
    pub ram_per_node: u32,
    /// GiB.
    pub os_disk_size: u32,
    /// GiB. Non-zero only for storage-carrying tiers.
    pub data_disk_size: u32,
    pub role_tags: Vec<String>,
}

impl TierSizing {
    pub fn has_storage_role(&self) -> bool {
        self.role_tags.iter().any(|r| r == STORAGE_ROLE)
    }

    fn check(&self) -> Result<(), TopologyError> {
        let invalid = |reason: String| TopologyError::InvalidSizing {
            scale: self.scale_tier,
            vm_type: self.vm_type,
            reason,
        };

        if let Some(fixed) = self.vm_type.fixed_node_count() {
            if self.node_count != fixed {
                return Err(invalid(format!(
                    "node_count must be {fixed}, got {}",
                    self.node_count
                )));
            }
        }

        if self.vm_type.is_load_balancer() && self.data_disk_size != 0 {
            return Err(invalid("load balancers carry no data disk".to_string()));
        }

        match (self.has_storage_role(), self.data_disk_size > 0) {
            (true, false) => Err(invalid(format!(
                "'{STORAGE_ROLE}' nodes need a data disk"
            ))),
            (false, true) => Err(invalid(format!(
                "data disk of {} GiB without the '{STORAGE_ROLE}' role",
                self.data_disk_size
            ))),
            _ => Ok(()),
        }
    }
}

/// Validated sizing table, indexed by scale tier.
#[derive(Debug, Clone)]
pub struct SizingTable {
    tiers: BTreeMap<u32, Vec<TierSizing>>,
}

impl SizingTable {
    /// Build a table from rows, rejecting any row that breaks a tier invariant.
    ///
    /// Every scale tier must define each vm type exactly once.
    pub fn new(rows: Vec<TierSizing>) -> Result<Self, TopologyError> {
        let mut tiers: BTreeMap<u32, Vec<TierSizing>> = BTreeMap::new();
        for row in rows {
            row.check()?;
            tiers.entry(row.scale_tier).or_default().push(row);
        }

        for (scale, rows) in &mut tiers {
            let mut seen = BTreeSet::new();
            for row in rows.iter() {
                if !seen.insert(row.vm_type) {
                    return Err(TopologyError::InvalidSizing {
                        scale: *scale,
                        vm_type: row.vm_type,
                        reason: "defined more than once".to_string(),
                    });
                }
            }
            if let Some(missing) = VmType::ALL.into_iter().find(|t| !seen.contains(t)) {
                return Err(TopologyError::InvalidSizing {
                    scale: *scale,
                    vm_type: missing,
                    reason: "missing from tier".to_string(),
                });
            }
            rows.sort_by_key(|row| row.vm_type);
        }

        Ok(Self { tiers })
    }

    /// The table shipped with the service.
    pub fn builtin() -> Self {
        Self {
            tiers: builtin_rows().into_iter().fold(BTreeMap::new(), |mut acc, row| {
                acc.entry(row.scale_tier).or_insert_with(Vec::new).push(row);
                acc
            }),
        }
    }

    /// Defined scale tiers, ascending.
    pub fn scales(&self) -> Vec<u32> {
        self.tiers.keys().copied().collect()
    }

    /// Rows for one scale tier, in vm type order.
    pub fn rows(&self, scale: u32) -> Result<&[TierSizing], TopologyError> {
        self.tiers
            .get(&scale)
            .map(Vec::as_slice)
            .ok_or_else(|| TopologyError::UnknownScaleTier {
                scale,
                known: self.scales(),
            })
    }
}

impl Default for SizingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[allow(clippy::too_many_arguments)]
fn row(
    scale_tier: u32,
    vm_type: VmType,
    node_count: u32,
    cpu_per_node: u32,
    ram_per_node: u32,
    os_disk_size: u32,
    data_disk_size: u32,
    roles: &str,
) -> TierSizing {
    TierSizing {
        scale_tier,
        vm_type,
        node_count,
        cpu_per_node,
        ram_per_node,
        os_disk_size,
        data_disk_size,
        role_tags: roles.split(',').map(str::to_string).collect(),
    }
}

fn builtin_rows() -> Vec<TierSizing> {
    use VmType::*;

    vec![
        // 100 users: the control planes also carry storage and workloads.
        row(100, RkeappsControl, 3, 4, 8192, 80, 100, "master,worker,cns"),
        row(100, RkeappsCns, 0, 4, 8192, 80, 100, "worker,cns"),
        row(100, RkeappsWorker, 0, 4, 8192, 80, 0, "worker"),
        row(100, RkemiddlewareControl, 3, 4, 8192, 80, 100, "master,worker,cns"),
        row(100, RkemiddlewareCns, 0, 4, 8192, 80, 100, "worker,cns"),
        row(100, RkemiddlewareWorker, 0, 4, 8192, 80, 0, "worker"),
        row(100, Rkedmz, 3, 4, 4096, 80, 100, "master,worker,cns"),
        row(100, Lblan, 2, 2, 2048, 60, 0, "loadbalancer"),
        row(100, Lbdmz, 2, 2, 2048, 60, 0, "loadbalancer"),
        row(100, Lbintegration, 2, 2, 2048, 60, 0, "loadbalancer"),
        row(100, Gitops, 1, 4, 8192, 260, 0, "git,docker-registry"),
        row(100, Monitoring, 1, 4, 16384, 260, 0, "admin,monitoring"),
        row(100, Vault, 1, 4, 16384, 80, 0, "vault"),
        // 500 users
        row(500, RkeappsControl, 3, 4, 8192, 80, 0, "master"),
        row(500, RkeappsCns, 3, 4, 8192, 80, 150, "worker,cns"),
        row(500, RkeappsWorker, 1, 4, 8192, 80, 0, "worker"),
        row(500, RkemiddlewareControl, 3, 4, 8192, 80, 0, "master"),
        row(500, RkemiddlewareCns, 3, 4, 8192, 100, 150, "worker,cns"),
        row(500, RkemiddlewareWorker, 1, 4, 8192, 80, 0, "worker"),
        row(500, Rkedmz, 3, 4, 8192, 80, 200, "master,worker,cns"),
        row(500, Lblan, 2, 4, 4096, 60, 0, "loadbalancer"),
        row(500, Lbdmz, 2, 4, 4096, 60, 0, "loadbalancer"),
        row(500, Lbintegration, 2, 2, 2048, 60, 0, "loadbalancer"),
        row(500, Gitops, 1, 4, 8192, 260, 0, "git,docker-registry"),
        row(500, Monitoring, 1, 4, 8192, 260, 0, "admin,monitoring"),
        row(500, Vault, 1, 4, 8192, 80, 0, "vault"),
        // 1000 users
        row(1000, RkeappsControl, 3, 4, 8192, 80, 0, "master"),
        row(1000, RkeappsCns, 3, 4, 8192, 80, 200, "worker,cns"),
        row(1000, RkeappsWorker, 5, 8, 16384, 80, 0, "worker"),
        row(1000, RkemiddlewareControl, 3, 4, 8192, 80, 0, "master"),
        row(1000, RkemiddlewareCns, 3, 4, 8192, 80, 200, "worker,cns"),
        row(1000, RkemiddlewareWorker, 4, 8, 16384, 80, 0, "worker"),
        row(1000, Rkedmz, 3, 6, 8192, 80, 250, "master,worker,cns"),
        row(1000, Lblan, 2, 4, 4096, 60, 0, "loadbalancer"),
        row(1000, Lbdmz, 2, 4, 4096, 60, 0, "loadbalancer"),
        row(1000, Lbintegration, 2, 4, 4096, 60, 0, "loadbalancer"),
        row(1000, Gitops, 1, 4, 8192, 260, 0, "git,docker-registry"),
        row(1000, Monitoring, 1, 6, 16384, 260, 0, "admin,monitoring"),
        row(1000, Vault, 1, 4, 8192, 80, 0, "vault"),
        // 10000 users
        row(10000, RkeappsControl, 3, 4, 8192, 80, 0, "master"),
        row(10000, RkeappsCns, 3, 4, 8192, 80, 400, "worker,cns"),
        row(10000, RkeappsWorker, 6, 8, 16384, 80, 0, "worker"),
        row(10000, RkemiddlewareControl, 3, 4, 8192, 80, 0, "master"),
        row(10000, RkemiddlewareCns, 3, 4, 8192, 80, 500, "worker,cns"),
        row(10000, RkemiddlewareWorker, 12, 8, 16384, 80, 0, "worker"),
        row(10000, Rkedmz, 3, 8, 16384, 80, 200, "master,worker,cns"),
        row(10000, Lblan, 2, 8, 8192, 60, 0, "loadbalancer"),
        row(10000, Lbdmz, 2, 8, 8192, 60, 0, "loadbalancer"),
        row(10000, Lbintegration, 2, 4, 4096, 60, 0, "loadbalancer"),
        row(10000, Gitops, 1, 8, 16384, 560, 0, "git,docker-registry"),
        row(10000, Monitoring, 1, 8, 32768, 560, 0, "admin,monitoring"),
        row(10000, Vault, 1, 4, 16384, 80, 0, "vault"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_passes_validation() {
        let table = SizingTable::new(builtin_rows()).unwrap();
        assert_eq!(table.scales(), vec![100, 500, 1000, 10000]);
        for scale in table.scales() {
            assert_eq!(table.rows(scale).unwrap().len(), VmType::ALL.len());
        }
    }

    #[test]
    fn test_unknown_scale() {
        let table = SizingTable::builtin();
        match table.rows(250) {
            Err(TopologyError::UnknownScaleTier { scale, known }) => {
                assert_eq!(scale, 250);
                assert_eq!(known, vec![100, 500, 1000, 10000]);
            }
            other => panic!("expected UnknownScaleTier, got {other:?}"),
        }
    }

    fn rows_with(scale: u32, patch: impl Fn(&mut TierSizing)) -> Vec<TierSizing> {
        let mut rows: Vec<TierSizing> = builtin_rows()
            .into_iter()
            .filter(|r| r.scale_tier == 100)
            .collect();
        for row in &mut rows {
            row.scale_tier = scale;
            patch(row);
        }
        rows
    }

    #[test]
    fn test_rejects_wrong_control_plane_count() {
        let rows = rows_with(50, |row| {
            if row.vm_type == VmType::RkeappsControl {
                row.node_count = 5;
            }
        });
        assert!(matches!(
            SizingTable::new(rows),
            Err(TopologyError::InvalidSizing {
                vm_type: VmType::RkeappsControl,
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_data_disk_without_storage_role() {
        let rows = rows_with(50, |row| {
            if row.vm_type == VmType::Gitops {
                row.data_disk_size = 200;
            }
        });
        assert!(matches!(
            SizingTable::new(rows),
            Err(TopologyError::InvalidSizing {
                vm_type: VmType::Gitops,
                ..
            })
        ));
    }

    #[test]
    fn test_rejects_load_balancer_with_disk() {
        let rows = rows_with(50, |row| {
            if row.vm_type == VmType::Lbdmz {
                row.data_disk_size = 10;
                row.role_tags.push(STORAGE_ROLE.to_string());
            }
        });
        assert!(SizingTable::new(rows).is_err());
    }

    #[test]
    fn test_rejects_incomplete_tier() {
        let rows: Vec<TierSizing> = rows_with(50, |_| {})
            .into_iter()
            .filter(|r| r.vm_type != VmType::Vault)
            .collect();
        assert!(matches!(
            SizingTable::new(rows),
            Err(TopologyError::InvalidSizing {
                vm_type: VmType::Vault,
                ..
            })
        ));
    }

    #[test]
    fn test_rows_deserialize_from_toml() {
        let row: TierSizing = toml::from_str(
            r#"
            scale_tier = 250
            vm_type = "RKEAPPS_CNS"
            node_count = 3
            cpu_per_node = 4
            ram_per_node = 8192
            os_disk_size = 80
            data_disk_size = 120
            role_tags = ["worker", "cns"]
            "#,
        )
        .unwrap();
        assert_eq!(row.vm_type, VmType::RkeappsCns);
        assert!(row.has_storage_role());
    }
}
