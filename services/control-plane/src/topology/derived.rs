//! Name-resolution and network-flow records derived from the VM set.
//!
//! Both sets are pure functions of settings, VMs and shared services and are
//! always replaced wholesale, so recomputing with unchanged inputs yields
//! identical records.

use rusqlite::Connection;

use super::tier::{Cluster, VmType};
use crate::db::{
    inventory, DnsRecord, FlowRule, Settings, SharedService, SharedServiceKind, StoreError,
    VirtualMachine,
};

/// Service aliases and the tier whose first VM answers for them.
const SERVICE_ALIASES: &[(&str, VmType)] = &[
    ("gogs", VmType::Gitops),
    ("registry", VmType::Gitops),
    ("vault", VmType::Vault),
    ("rancher", VmType::Lblan),
    ("argocd", VmType::Lblan),
    ("longhorn", VmType::Lblan),
    ("grafana", VmType::Lblan),
];

pub const HTTPS_PORT: u16 = 443;
pub const VAULT_PORT: u16 = 8200;
pub const REGISTRY_PORT: u16 = 8443;

fn first_of(vms: &[VirtualMachine], tier: VmType) -> Option<&VirtualMachine> {
    vms.iter().filter(|vm| vm.tier == tier).min_by_key(|vm| vm.id)
}

fn of_tier(vms: &[VirtualMachine], tier: VmType) -> impl Iterator<Item = &VirtualMachine> {
    vms.iter().filter(move |vm| vm.tier == tier)
}

fn cluster_nodes(vms: &[VirtualMachine]) -> impl Iterator<Item = &VirtualMachine> {
    vms.iter().filter(|vm| vm.tier.cluster().is_some())
}

/// One record per VM plus the well-known service aliases.
pub fn derive_dns(settings: &Settings, vms: &[VirtualMachine]) -> Vec<DnsRecord> {
    let mut records: Vec<DnsRecord> = vms
        .iter()
        .map(|vm| DnsRecord {
            name: format!("{}.{}", vm.hostname, settings.base_domain),
            hostname: vm.hostname.clone(),
            ip: vm.ip.clone(),
        })
        .collect();

    for (alias, tier) in SERVICE_ALIASES {
        if let Some(vm) = first_of(vms, *tier) {
            records.push(DnsRecord {
                name: settings.service_fqdn(alias),
                hostname: vm.hostname.clone(),
                ip: vm.ip.clone(),
            });
        }
    }

    records
}

fn flow(
    source: &VirtualMachine,
    destination: &str,
    port: u16,
    protocol: &str,
    description: String,
) -> FlowRule {
    FlowRule {
        id: 0,
        source: source.ip.clone(),
        destination: destination.to_string(),
        port,
        protocol: protocol.to_string(),
        is_open: false,
        description,
    }
}

/// Flows between tiers and from tiers to shared services. All start closed.
pub fn derive_flows(vms: &[VirtualMachine], services: &[SharedService]) -> Vec<FlowRule> {
    let mut flows = Vec::new();

    for cluster in [Cluster::Apps, Cluster::Middleware, Cluster::Dmz] {
        let lb_tier = cluster.load_balancer();
        for lb in of_tier(vms, lb_tier) {
            for node in vms.iter().filter(|vm| vm.tier.cluster() == Some(cluster)) {
                flows.push(flow(
                    lb,
                    &node.ip,
                    HTTPS_PORT,
                    "tcp",
                    format!("{} -> {} ingress", lb.hostname, node.hostname),
                ));
            }
        }
    }

    for node in cluster_nodes(vms) {
        for vault in of_tier(vms, VmType::Vault) {
            flows.push(flow(
                node,
                &vault.ip,
                VAULT_PORT,
                "tcp",
                format!("{} -> {} secret store", node.hostname, vault.hostname),
            ));
        }
        for gitops in of_tier(vms, VmType::Gitops) {
            for port in [HTTPS_PORT, REGISTRY_PORT] {
                flows.push(flow(
                    node,
                    &gitops.ip,
                    port,
                    "tcp",
                    format!("{} -> {} source/registry", node.hostname, gitops.hostname),
                ));
            }
        }
    }

    for service in services {
        let sources: Vec<&VirtualMachine> = match service.kind {
            SharedServiceKind::SecretStore | SharedServiceKind::SourceRegistry => {
                cluster_nodes(vms).collect()
            }
            SharedServiceKind::Directory
            | SharedServiceKind::Database
            | SharedServiceKind::Messaging => of_tier(vms, VmType::Lbintegration).collect(),
        };
        for source in sources {
            flows.push(flow(
                source,
                &service.host,
                service.port,
                &service.protocol,
                format!(
                    "{} -> {} ({})",
                    source.hostname,
                    service.name,
                    service.kind.as_str()
                ),
            ));
        }
    }

    flows
}

/// Recompute and replace both derived sets from the persisted inventory.
///
/// Flows whose endpoints, port and protocol survive the recomputation keep
/// their open flag.
pub(crate) fn recompute_tx(conn: &Connection) -> Result<(usize, usize), StoreError> {
    let settings = inventory::get_settings_tx(conn)?;
    let vms = inventory::list_vms_tx(conn, None)?;
    let services = inventory::list_shared_services_tx(conn)?;
    let open = inventory::open_flow_keys_tx(conn)?;

    let dns = derive_dns(&settings, &vms);
    let mut flows = derive_flows(&vms, &services);
    for flow in &mut flows {
        flow.is_open = open.contains(&flow.key());
    }
    inventory::replace_derived_tx(conn, &dns, &flows)?;
    Ok((dns.len(), flows.len()))
}
