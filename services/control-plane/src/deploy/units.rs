//! Built-in unit resolvers.
//!
//! Resolvers read settings and VM records and produce the engine's variables
//! plus an Ansible-style inventory (`all.hosts` / `all.children.<group>`).

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::registry::{InputResolver, ResolverError, UnitInputs, UnitRegistry};
use super::vault::VaultBootstrap;
use crate::db::{Settings, Store, VirtualMachine};
use crate::topology::derived::{REGISTRY_PORT, VAULT_PORT};
use crate::topology::{Cluster, VmType};

pub const PREPARE_VMS: &str = "prepare-vms";
pub const INSTALL_DOCKER_REGISTRY: &str = "install-docker-registry";
pub const INSTALL_GOGS: &str = "install-gogs";
pub const INSTALL_RKE2_APPS: &str = "install-rke2-apps";
pub const INSTALL_RKE2_MIDDLEWARE: &str = "install-rke2-middleware";
pub const INSTALL_RKE2_DMZ: &str = "install-rke2-dmz";
pub const INSTALL_LOAD_BALANCER: &str = "install-load-balancer";
pub const INSTALL_LONGHORN: &str = "install-longhorn";
pub const INSTALL_ARGOCD: &str = "install-argocd";
pub const INSTALL_MONITORING: &str = "install-monitoring";
pub const INSTALL_NEUVECTOR: &str = "install-neuvector";
pub const INSTALL_VAULT: &str = "install-vault";

/// Units appended to every run when embedded monitoring is enabled.
pub const MONITORING_UNITS: [&str; 2] = [INSTALL_MONITORING, INSTALL_NEUVECTOR];

/// Default pipeline.
pub const DEFAULT_UNITS: [&str; 6] = [
    PREPARE_VMS,
    INSTALL_DOCKER_REGISTRY,
    INSTALL_GOGS,
    INSTALL_RKE2_APPS,
    INSTALL_LONGHORN,
    INSTALL_ARGOCD,
];

const ANSIBLE_USER: &str = "devops";

/// Registry with every built-in unit.
pub fn builtin_registry(vault: VaultBootstrap) -> UnitRegistry {
    let mut registry = UnitRegistry::new();
    registry
        .register(PREPARE_VMS, PrepareVms)
        .register(INSTALL_DOCKER_REGISTRY, DockerRegistry)
        .register(INSTALL_GOGS, Gogs)
        .register(INSTALL_RKE2_APPS, Rke2Cluster(Cluster::Apps))
        .register(INSTALL_RKE2_MIDDLEWARE, Rke2Cluster(Cluster::Middleware))
        .register(INSTALL_RKE2_DMZ, Rke2Cluster(Cluster::Dmz))
        .register(INSTALL_LOAD_BALANCER, LoadBalancers)
        .register(INSTALL_LONGHORN, KubernetesApp::new(INSTALL_LONGHORN, "longhorn", Cluster::Apps))
        .register(INSTALL_ARGOCD, KubernetesApp::new(INSTALL_ARGOCD, "argocd", Cluster::Apps))
        .register(INSTALL_MONITORING, KubernetesApp::new(INSTALL_MONITORING, "grafana", Cluster::Apps))
        .register(INSTALL_NEUVECTOR, KubernetesApp::new(INSTALL_NEUVECTOR, "neuvector", Cluster::Apps))
        .register_with_hook(INSTALL_VAULT, Vault, vault);
    registry
}

// =============================================================================
// Helpers
// =============================================================================

fn host(vm: &VirtualMachine) -> Value {
    json!({
        "ansible_host": vm.ip,
        "ansible_user": ANSIBLE_USER,
    })
}

fn localhost() -> Value {
    json!({
        "ansible_host": "127.0.0.1",
        "ansible_connection": "local",
    })
}

fn hosts<'a>(vms: impl IntoIterator<Item = &'a VirtualMachine>) -> Map<String, Value> {
    vms.into_iter()
        .map(|vm| (vm.hostname.clone(), host(vm)))
        .collect()
}

fn group(vms: &[VirtualMachine]) -> Value {
    json!({ "hosts": hosts(vms) })
}

fn local_inventory() -> Value {
    json!({ "all": { "hosts": { "localhost": localhost() } } })
}

/// VMs of `tier`, failing when there are none.
fn require(store: &Store, unit: &str, tier: VmType) -> Result<Vec<VirtualMachine>, ResolverError> {
    let vms = store.list_vms(Some(tier))?;
    if vms.is_empty() {
        return Err(ResolverError::MissingTier {
            unit: unit.to_string(),
            tier,
        });
    }
    Ok(vms)
}

fn common_vars(settings: &Settings) -> Map<String, Value> {
    let mut vars = Map::new();
    vars.insert("base_domain".into(), json!(settings.base_domain));
    vars.insert("env_prefix".into(), json!(settings.name_prefix()));
    vars.insert(
        "registry_url".into(),
        json!(format!("{}:{REGISTRY_PORT}", settings.service_fqdn("registry"))),
    );
    vars.insert("gogs_url".into(), json!(settings.service_fqdn("gogs")));
    vars
}

// =============================================================================
// Resolvers
// =============================================================================

/// Base packages, SSH keys and container runtime on every VM.
pub struct PrepareVms;

#[async_trait]
impl InputResolver for PrepareVms {
    async fn get_inputs(&self, store: &Store) -> Result<UnitInputs, ResolverError> {
        let settings = store.get_settings()?;
        let vms = store.list_vms(None)?;
        if vms.is_empty() {
            return Err(ResolverError::Invalid {
                unit: PREPARE_VMS.to_string(),
                reason: "no virtual machines have been planned".to_string(),
            });
        }

        let mut children = Map::new();
        for tier in VmType::ALL {
            let members: Vec<&VirtualMachine> = vms.iter().filter(|vm| vm.tier == tier).collect();
            if !members.is_empty() {
                children.insert(
                    tier.as_str().to_lowercase(),
                    json!({ "hosts": hosts(members) }),
                );
            }
        }

        let mut vars = common_vars(&settings);
        vars.insert("dns_servers".into(), json!(zone_dns(store)?));

        Ok(UnitInputs {
            vars,
            inventory: json!({ "all": { "children": children } }),
        })
    }
}

fn zone_dns(store: &Store) -> Result<Vec<String>, ResolverError> {
    let mut servers: Vec<String> = store.list_zones()?.into_iter().map(|z| z.dns).collect();
    servers.sort();
    servers.dedup();
    Ok(servers)
}

/// Private image registry on the GITOPS VM.
pub struct DockerRegistry;

#[async_trait]
impl InputResolver for DockerRegistry {
    async fn get_inputs(&self, store: &Store) -> Result<UnitInputs, ResolverError> {
        let settings = store.get_settings()?;
        let gitops = require(store, INSTALL_DOCKER_REGISTRY, VmType::Gitops)?;

        let mut vars = common_vars(&settings);
        vars.insert("registry_ip".into(), json!(gitops[0].ip));
        vars.insert("registry_port".into(), json!(REGISTRY_PORT));

        Ok(UnitInputs {
            vars,
            inventory: json!({ "all": { "hosts": hosts(&gitops[..1]) } }),
        })
    }
}

/// Git server on the GITOPS VM.
pub struct Gogs;

#[async_trait]
impl InputResolver for Gogs {
    async fn get_inputs(&self, store: &Store) -> Result<UnitInputs, ResolverError> {
        let settings = store.get_settings()?;
        let gitops = require(store, INSTALL_GOGS, VmType::Gitops)?;
        let target = &gitops[0];

        let mut vars = common_vars(&settings);
        vars.insert("domain_name".into(), json!(settings.service_fqdn("gogs")));
        vars.insert("gitops_ip".into(), json!(target.ip));

        Ok(UnitInputs {
            vars,
            inventory: json!({
                "all": {
                    "hosts": {
                        "gogs-target": host(target),
                        "localhost": localhost(),
                    }
                }
            }),
        })
    }
}

/// RKE2 Kubernetes cluster.
pub struct Rke2Cluster(pub Cluster);

#[async_trait]
impl InputResolver for Rke2Cluster {
    async fn get_inputs(&self, store: &Store) -> Result<UnitInputs, ResolverError> {
        let cluster = self.0;
        let unit = format!("install-rke2-{}", cluster.name());
        let settings = store.get_settings()?;
        let masters = require(store, &unit, cluster.control_plane())?;

        let mut agents = Vec::new();
        for tier in cluster.agents() {
            agents.extend(store.list_vms(Some(*tier))?);
        }

        let lb_ip = store
            .list_vms(Some(cluster.load_balancer()))?
            .first()
            .map(|vm| vm.ip.clone());

        let mut vars = common_vars(&settings);
        vars.insert("cluster_name".into(), json!(cluster.name()));
        vars.insert("first_master_ip".into(), json!(masters[0].ip));
        vars.insert(
            "tls_san".into(),
            json!([lb_ip.clone().unwrap_or_else(|| masters[0].ip.clone())]),
        );
        vars.insert("load_balancer_ip".into(), json!(lb_ip));

        Ok(UnitInputs {
            vars,
            inventory: json!({
                "all": {
                    "children": {
                        "masters": group(&masters),
                        "workers": group(&agents),
                    }
                }
            }),
        })
    }
}

/// HAProxy pairs in front of each cluster.
pub struct LoadBalancers;

#[async_trait]
impl InputResolver for LoadBalancers {
    async fn get_inputs(&self, store: &Store) -> Result<UnitInputs, ResolverError> {
        let settings = store.get_settings()?;
        let mut children = Map::new();
        let mut backends = Map::new();

        for cluster in [Cluster::Apps, Cluster::Middleware, Cluster::Dmz] {
            let lb_tier = cluster.load_balancer();
            let lbs = require(store, INSTALL_LOAD_BALANCER, lb_tier)?;

            let mut nodes = store.list_vms(Some(cluster.control_plane()))?;
            for tier in cluster.agents() {
                nodes.extend(store.list_vms(Some(*tier))?);
            }

            let group_name = lb_tier.as_str().to_lowercase();
            children.insert(group_name.clone(), group(&lbs));
            backends.insert(
                group_name,
                json!(nodes.iter().map(|vm| vm.ip.as_str()).collect::<Vec<_>>()),
            );
        }

        let mut vars = common_vars(&settings);
        vars.insert("backends".into(), Value::Object(backends));

        Ok(UnitInputs {
            vars,
            inventory: json!({ "all": { "children": children } }),
        })
    }
}

/// Application deployed onto a cluster from the control host.
pub struct KubernetesApp {
    unit: &'static str,
    app: &'static str,
    cluster: Cluster,
}

impl KubernetesApp {
    pub fn new(unit: &'static str, app: &'static str, cluster: Cluster) -> Self {
        Self { unit, app, cluster }
    }
}

#[async_trait]
impl InputResolver for KubernetesApp {
    async fn get_inputs(&self, store: &Store) -> Result<UnitInputs, ResolverError> {
        let settings = store.get_settings()?;
        let masters = require(store, self.unit, self.cluster.control_plane())?;

        let mut vars = common_vars(&settings);
        vars.insert("app_url".into(), json!(settings.service_fqdn(self.app)));
        vars.insert(
            "kube_api".into(),
            json!(format!("https://{}:6443", masters[0].ip)),
        );
        vars.insert("cluster_name".into(), json!(self.cluster.name()));

        Ok(UnitInputs {
            vars,
            inventory: local_inventory(),
        })
    }
}

/// Secret store on the VAULT VM.
pub struct Vault;

#[async_trait]
impl InputResolver for Vault {
    async fn get_inputs(&self, store: &Store) -> Result<UnitInputs, ResolverError> {
        let settings = store.get_settings()?;
        let vault = require(store, INSTALL_VAULT, VmType::Vault)?;

        let mut vars = common_vars(&settings);
        vars.insert("vault_ip".into(), json!(vault[0].ip));
        vars.insert(
            "vault_url".into(),
            json!(format!("https://{}:{VAULT_PORT}", settings.service_fqdn("vault"))),
        );

        Ok(UnitInputs {
            vars,
            inventory: json!({ "all": { "hosts": hosts(&vault[..1]) } }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::inventory::tests::{test_settings, zone};
    use crate::topology::{Planner, Topology};

    fn materialized() -> Store {
        let store = Store::open_in_memory().unwrap();
        store.seed_settings(&test_settings()).unwrap();
        store
            .seed_zones(&[
                zone("apps", 1, (10, 200)),
                zone("infra", 2, (10, 200)),
                zone("dmz", 3, (10, 200)),
            ])
            .unwrap();
        Topology::new(store.clone(), Planner::default())
            .apply_scale(500)
            .unwrap();
        store
    }

    fn registry() -> UnitRegistry {
        builtin_registry(VaultBootstrap::new().unwrap())
    }

    #[tokio::test]
    async fn test_every_builtin_unit_resolves() {
        let store = materialized();
        let registry = registry();

        for name in registry.names().map(str::to_string).collect::<Vec<_>>() {
            let entry = registry.get(&name).unwrap();
            let inputs = entry.resolver.get_inputs(&store).await.unwrap();
            inputs.validate(&name).unwrap();
        }
        assert!(registry.get(INSTALL_VAULT).unwrap().hook.is_some());
        for unit in DEFAULT_UNITS.iter().chain(MONITORING_UNITS.iter()) {
            assert!(registry.contains(unit), "{unit} not registered");
        }
    }

    #[tokio::test]
    async fn test_resolvers_fail_without_vms() {
        let store = Store::open_in_memory().unwrap();
        store.seed_settings(&test_settings()).unwrap();

        assert!(matches!(
            Gogs.get_inputs(&store).await,
            Err(ResolverError::MissingTier {
                tier: VmType::Gitops,
                ..
            })
        ));
        assert!(matches!(
            PrepareVms.get_inputs(&store).await,
            Err(ResolverError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_rke2_inventory_groups() {
        let store = materialized();
        let inputs = Rke2Cluster(Cluster::Apps).get_inputs(&store).await.unwrap();

        let masters = inputs.inventory["all"]["children"]["masters"]["hosts"]
            .as_object()
            .unwrap();
        let workers = inputs.inventory["all"]["children"]["workers"]["hosts"]
            .as_object()
            .unwrap();
        assert_eq!(masters.len(), 3);
        assert_eq!(workers.len(), 4);
        assert!(masters.contains_key("test-rkeapp-master1"));
        assert_eq!(inputs.vars["cluster_name"], "apps");
        assert_eq!(
            inputs.vars["registry_url"],
            "test-registry.example.org:8443"
        );
    }

    #[tokio::test]
    async fn test_gogs_targets_gitops_vm() {
        let store = materialized();
        let gitops = store.list_vms(Some(VmType::Gitops)).unwrap();
        let inputs = Gogs.get_inputs(&store).await.unwrap();

        assert_eq!(
            inputs.inventory["all"]["hosts"]["gogs-target"]["ansible_host"],
            gitops[0].ip.as_str()
        );
        assert_eq!(inputs.vars["domain_name"], "test-gogs.example.org");
    }
}
