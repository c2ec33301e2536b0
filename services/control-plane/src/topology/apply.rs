//! Materializes a planned topology into persisted VM records.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, instrument};

use super::derived;
use super::planner::Planner;
use super::sizing::TierSizing;
use super::TopologyError;
use crate::db::{inventory, Store, VirtualMachine, VmUpdate};
use crate::ipam;

/// Outcome of one materialization.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializeReport {
    pub scale: u32,
    pub vms: Vec<VirtualMachine>,
    /// VMs deleted from the affected zones before recreation.
    pub replaced: usize,
    pub dns_records: usize,
    pub flow_rules: usize,
}

/// Topology service: planning plus persistence.
#[derive(Clone)]
pub struct Topology {
    store: Store,
    planner: Planner,
}

impl Topology {
    pub fn new(store: Store, planner: Planner) -> Self {
        Self { store, planner }
    }

    pub fn planner(&self) -> &Planner {
        &self.planner
    }

    /// Sizing rows for one scale tier.
    pub fn sizing(&self, scale: u32) -> Result<Vec<TierSizing>, TopologyError> {
        Ok(self.planner.table().rows(scale)?.to_vec())
    }

    /// Replace the VM set of every affected zone with the plan for `scale`.
    ///
    /// Runs in one transaction: planning, zone lookups, allocation,
    /// insertion and the derived-record refresh either all land or none do.
    #[instrument(skip(self))]
    pub fn apply_scale(&self, scale: u32) -> Result<MaterializeReport, TopologyError> {
        let report = self.store.with_tx(|tx| {
            let settings = inventory::get_settings_tx(tx)?;
            let specs = self.planner.plan(scale, &settings.name_prefix())?;

            let mut zones = BTreeMap::new();
            for spec in &specs {
                if zones.contains_key(spec.zone()) {
                    continue;
                }
                let zone = inventory::zone_by_name_tx(tx, spec.zone())?.ok_or_else(|| {
                    TopologyError::ZoneMissing {
                        zone: spec.zone().to_string(),
                        vm_type: spec.vm_type,
                    }
                })?;
                zones.insert(spec.zone(), zone);
            }

            let mut replaced = 0;
            for zone in zones.values() {
                replaced += inventory::delete_zone_vms_tx(tx, zone.id)?;
            }

            let mut vms = Vec::with_capacity(specs.len());
            for spec in &specs {
                let zone = &zones[spec.zone()];
                let ip = ipam::allocate_tx(tx, zone)?;
                vms.push(inventory::insert_vm_tx(tx, spec, zone.id, ip)?);
            }

            let (dns_records, flow_rules) = derived::recompute_tx(tx)?;
            inventory::set_scale_tx(tx, scale)?;

            Ok::<_, TopologyError>(MaterializeReport {
                scale,
                vms,
                replaced,
                dns_records,
                flow_rules,
            })
        })?;

        info!(
            scale,
            vms = report.vms.len(),
            replaced = report.replaced,
            dns_records = report.dns_records,
            flow_rules = report.flow_rules,
            "Topology materialized"
        );
        Ok(report)
    }

    /// Apply a reconciliation update to one VM and refresh derived records.
    #[instrument(skip(self, update))]
    pub fn update_vm(&self, id: i64, update: &VmUpdate) -> Result<VirtualMachine, TopologyError> {
        let vm = self.store.with_tx(|tx| {
            let vm = inventory::update_vm_tx(tx, id, update)?;
            derived::recompute_tx(tx)?;
            Ok::<_, TopologyError>(vm)
        })?;
        info!(vm_id = id, hostname = %vm.hostname, ip = %vm.ip, "VM reconciled");
        Ok(vm)
    }

    /// Recompute derived records from the current inventory.
    pub fn refresh_derived(&self) -> Result<(), TopologyError> {
        self.store.with_tx(|tx| {
            derived::recompute_tx(tx)?;
            Ok(())
        })
    }
}
