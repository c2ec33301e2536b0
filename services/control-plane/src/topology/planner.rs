//! Expands a scale parameter into concrete VM specifications.

use serde::Serialize;

use super::sizing::SizingTable;
use super::tier::{VmType, STORAGE_ROLE};
use super::TopologyError;

/// A VM the planner wants to exist, before it has an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmSpec {
    pub hostname: String,
    pub vm_type: VmType,
    pub role_tags: Vec<String>,
    pub cpu: u32,
    pub ram: u32,
    pub os_disk: u32,
    pub data_disk: u32,
}

impl VmSpec {
    /// Zone this VM is placed in.
    pub fn zone(&self) -> &'static str {
        self.vm_type.zone()
    }
}

/// Build a hostname as `env_prefix + base + index`.
///
/// A leading `env_prefix` already present on `base` is stripped first so the
/// prefix never appears twice.
pub fn generate_hostname(base: &str, env_prefix: &str, index: u32) -> String {
    let base = if env_prefix.is_empty() {
        base
    } else {
        base.strip_prefix(env_prefix).unwrap_or(base)
    };
    format!("{env_prefix}{base}{index}")
}

/// Pure planner over a sizing table.
#[derive(Debug, Clone, Default)]
pub struct Planner {
    table: SizingTable,
}

impl Planner {
    pub fn new(table: SizingTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SizingTable {
        &self.table
    }

    /// Every VM required at `scale`, grouped by vm type then index.
    ///
    /// `env_prefix` is the hostname prefix (e.g. `"test-"`).
    pub fn plan(&self, scale: u32, env_prefix: &str) -> Result<Vec<VmSpec>, TopologyError> {
        let rows = self.table.rows(scale)?;

        let specs = rows
            .iter()
            .flat_map(|row| {
                let data_disk = if row.has_storage_role() {
                    row.data_disk_size
                } else {
                    0
                };
                (1..=row.node_count).map(move |index| VmSpec {
                    hostname: generate_hostname(row.vm_type.hostname_prefix(), env_prefix, index),
                    vm_type: row.vm_type,
                    role_tags: row.role_tags.clone(),
                    cpu: row.cpu_per_node,
                    ram: row.ram_per_node,
                    os_disk: row.os_disk_size,
                    data_disk,
                })
            })
            .collect();

        Ok(specs)
    }
}


/// Whether a spec honours the storage-disk rule.
pub fn storage_consistent(spec: &VmSpec) -> bool {
    let has_storage = spec.role_tags.iter().any(|r| r == STORAGE_ROLE);
    has_storage == (spec.data_disk > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("vault", "test-", 1, "test-vault1")]
    #[case("test-vault", "test-", 1, "test-vault1")]
    #[case("rkeapp-master", "prod-", 3, "prod-rkeapp-master3")]
    #[case("lblan", "", 2, "lblan2")]
    #[case("test-lblan", "", 2, "test-lblan2")]
    fn test_generate_hostname(
        #[case] base: &str,
        #[case] prefix: &str,
        #[case] index: u32,
        #[case] expected: &str,
    ) {
        assert_eq!(generate_hostname(base, prefix, index), expected);
    }

    fn of_type(specs: &[VmSpec], vm_type: VmType) -> Vec<&VmSpec> {
        specs.iter().filter(|s| s.vm_type == vm_type).collect()
    }

    #[rstest]
    #[case(100)]
    #[case(500)]
    #[case(1000)]
    #[case(10000)]
    fn test_plan_tier_invariants(#[case] scale: u32) {
        let specs = Planner::default().plan(scale, "test-").unwrap();

        for vm_type in VmType::ALL {
            let vms = of_type(&specs, vm_type);
            if vm_type.is_control_plane() || vm_type.is_dmz() {
                assert_eq!(vms.len(), 3, "{vm_type} at {scale}");
            }
            if vm_type.is_load_balancer() {
                assert_eq!(vms.len(), 2, "{vm_type} at {scale}");
                assert!(vms.iter().all(|vm| vm.data_disk == 0));
            }
        }

        assert!(specs.iter().all(storage_consistent));
        assert!(specs
            .iter()
            .any(|s| s.role_tags.iter().any(|r| r == STORAGE_ROLE)));
    }

    #[test]
    fn test_plan_hostnames_are_unique_and_prefixed() {
        let specs = Planner::default().plan(10000, "test-").unwrap();
        let mut names: Vec<&str> = specs.iter().map(|s| s.hostname.as_str()).collect();
        assert!(names.iter().all(|n| n.starts_with("test-") && !n.starts_with("test-test-")));
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), specs.len());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let planner = Planner::default();
        assert_eq!(
            planner.plan(1000, "").unwrap(),
            planner.plan(1000, "").unwrap()
        );
    }

    #[test]
    fn test_plan_worker_counts_follow_scale() {
        let planner = Planner::default();
        let small = planner.plan(100, "").unwrap();
        let large = planner.plan(10000, "").unwrap();
        assert!(of_type(&small, VmType::RkeappsWorker).is_empty());
        assert_eq!(of_type(&large, VmType::RkemiddlewareWorker).len(), 12);
        assert_eq!(
            of_type(&large, VmType::RkeappsWorker)[0].hostname,
            "rkeapp-worker1"
        );
    }

    #[test]
    fn test_plan_unknown_scale() {
        assert!(matches!(
            Planner::default().plan(42, "test-"),
            Err(TopologyError::UnknownScaleTier { scale: 42, .. })
        ));
    }
}
