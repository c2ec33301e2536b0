//! Zones, virtual machines, settings, and the records derived from them.

use std::collections::HashSet;
use std::net::Ipv4Addr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use stratum_networking::{parse_ipv4, Ipv4Pool, Ipv4Subnet};

use super::{Store, StoreError};
use crate::ipam;
use crate::topology::{VmSpec, VmType};

// =============================================================================
// Settings
// =============================================================================

/// Deployment-wide settings consumed by the planner and unit resolvers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Target concurrent-user count; selects the sizing tier.
    pub scale: u32,
    pub base_domain: String,
    /// Environment name (e.g. "test"); empty for none.
    pub env_prefix: String,
    pub monitoring_enabled: bool,
}

impl Settings {
    /// Prefix applied to hostnames and service names ("test-" or "").
    pub fn name_prefix(&self) -> String {
        let env = self.env_prefix.trim();
        if env.is_empty() || env.ends_with('-') {
            env.to_string()
        } else {
            format!("{env}-")
        }
    }

    /// Fully qualified service name, e.g. `test-gogs.example.org`.
    pub fn service_fqdn(&self, service: &str) -> String {
        format!("{}{}.{}", self.name_prefix(), service, self.base_domain)
    }
}

/// Partial settings update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub base_domain: Option<String>,
    pub env_prefix: Option<String>,
    pub monitoring_enabled: Option<bool>,
}

pub(crate) fn get_settings_tx(conn: &Connection) -> Result<Settings, StoreError> {
    conn.query_row(
        "SELECT scale, base_domain, env_prefix, monitoring_enabled FROM settings WHERE id = 1",
        [],
        |row| {
            Ok(Settings {
                scale: row.get(0)?,
                base_domain: row.get(1)?,
                env_prefix: row.get(2)?,
                monitoring_enabled: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound("settings".to_string()))
}

pub(crate) fn set_scale_tx(conn: &Connection, scale: u32) -> Result<(), StoreError> {
    conn.execute("UPDATE settings SET scale = ?1 WHERE id = 1", params![scale])?;
    Ok(())
}

// =============================================================================
// Zones
// =============================================================================

/// Network zone owning an IPv4 pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Zone {
    pub id: i64,
    pub name: String,
    pub subnet: String,
    pub mask: u8,
    pub gateway: String,
    pub dns: String,
    pub domain: String,
    pub ip_pool_start: Option<String>,
    pub ip_pool_end: Option<String>,
    pub hypervisor_ref: Option<String>,
}

/// Zone definition loaded at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewZone {
    pub name: String,
    pub subnet: String,
    pub mask: u8,
    pub gateway: String,
    pub dns: String,
    pub domain: String,
    #[serde(default)]
    pub ip_pool_start: Option<String>,
    #[serde(default)]
    pub ip_pool_end: Option<String>,
    #[serde(default)]
    pub hypervisor_ref: Option<String>,
}

/// Partial zone update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ZoneUpdate {
    pub subnet: Option<String>,
    pub mask: Option<u8>,
    pub gateway: Option<String>,
    pub dns: Option<String>,
    pub domain: Option<String>,
    pub ip_pool_start: Option<String>,
    pub ip_pool_end: Option<String>,
    pub hypervisor_ref: Option<String>,
}

const ZONE_COLUMNS: &str =
    "id, name, subnet, mask, gateway, dns, domain, ip_pool_start, ip_pool_end, hypervisor_ref";

fn zone_from_row(row: &Row<'_>) -> rusqlite::Result<Zone> {
    Ok(Zone {
        id: row.get(0)?,
        name: row.get(1)?,
        subnet: row.get(2)?,
        mask: row.get(3)?,
        gateway: row.get(4)?,
        dns: row.get(5)?,
        domain: row.get(6)?,
        ip_pool_start: row.get(7)?,
        ip_pool_end: row.get(8)?,
        hypervisor_ref: row.get(9)?,
    })
}

/// Check subnet and pool bounds before they are persisted.
fn validate_zone_network(zone: &Zone) -> Result<(), StoreError> {
    let invalid = |e: stratum_networking::NetworkError| {
        StoreError::Invalid(format!("zone '{}': {e}", zone.name))
    };

    let subnet = Ipv4Subnet::new(parse_ipv4(&zone.subnet).map_err(invalid)?, zone.mask)
        .map_err(invalid)?;

    match (&zone.ip_pool_start, &zone.ip_pool_end) {
        (Some(start), Some(end)) => {
            let pool = Ipv4Pool::parse(start, end).map_err(invalid)?;
            pool.ensure_within(&subnet).map_err(invalid)
        }
        (None, None) => Ok(()),
        _ => Err(StoreError::Invalid(format!(
            "zone '{}': pool start and end must be set together",
            zone.name
        ))),
    }
}

pub(crate) fn zone_by_name_tx(conn: &Connection, name: &str) -> Result<Option<Zone>, StoreError> {
    Ok(conn
        .query_row(
            &format!("SELECT {ZONE_COLUMNS} FROM zones WHERE name = ?1"),
            params![name],
            zone_from_row,
        )
        .optional()?)
}

fn get_zone_tx(conn: &Connection, id: i64) -> Result<Zone, StoreError> {
    conn.query_row(
        &format!("SELECT {ZONE_COLUMNS} FROM zones WHERE id = ?1"),
        params![id],
        zone_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("zone {id}")))
}

// =============================================================================
// Virtual machines
// =============================================================================

/// VM provisioning status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmStatus {
    /// Planned, not yet provisioned.
    ToCreate,
    /// Provisioned by the hypervisor.
    Created,
    /// Reachable and configured.
    Running,
    /// Provisioning failed.
    Failed,
}

impl VmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToCreate => "to_create",
            Self::Created => "created",
            Self::Running => "running",
            Self::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "to_create" => Some(Self::ToCreate),
            "created" => Some(Self::Created),
            "running" => Some(Self::Running),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Persisted virtual machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualMachine {
    pub id: i64,
    pub hostname: String,
    pub role_tags: Vec<String>,
    pub tier: VmType,
    pub ip: String,
    pub cpu: u32,
    /// MiB.
    pub ram: u32,
    /// GiB.
    pub os_disk: u32,
    /// GiB.
    pub data_disk: u32,
    pub zone_id: i64,
    pub status: VmStatus,
}

impl VirtualMachine {
    pub fn has_role(&self, role: &str) -> bool {
        self.role_tags.iter().any(|r| r == role)
    }
}

/// Reconciliation update for one VM.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VmUpdate {
    pub hostname: Option<String>,
    pub ip: Option<String>,
    pub tier: Option<VmType>,
    pub status: Option<VmStatus>,
}

const VM_COLUMNS: &str =
    "id, hostname, role_tags, tier, ip, cpu, ram, os_disk, data_disk, zone_id, status";

fn vm_from_row(row: &Row<'_>) -> rusqlite::Result<VirtualMachine> {
    let role_tags: String = row.get(2)?;
    let tier: String = row.get(3)?;
    let status: String = row.get(10)?;

    let tier = tier.parse::<VmType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    let status = VmStatus::from_str(&status).unwrap_or(VmStatus::Failed);

    Ok(VirtualMachine {
        id: row.get(0)?,
        hostname: row.get(1)?,
        role_tags: split_tags(&role_tags),
        tier,
        ip: row.get(4)?,
        cpu: row.get(5)?,
        ram: row.get(6)?,
        os_disk: row.get(7)?,
        data_disk: row.get(8)?,
        zone_id: row.get(9)?,
        status,
    })
}

fn split_tags(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub(crate) fn list_vms_tx(
    conn: &Connection,
    tier: Option<VmType>,
) -> Result<Vec<VirtualMachine>, StoreError> {
    let vms = match tier {
        Some(tier) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {VM_COLUMNS} FROM virtual_machines WHERE tier = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![tier.as_str()], vm_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt =
                conn.prepare(&format!("SELECT {VM_COLUMNS} FROM virtual_machines ORDER BY id"))?;
            let rows = stmt.query_map([], vm_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };
    Ok(vms)
}

fn get_vm_tx(conn: &Connection, id: i64) -> Result<VirtualMachine, StoreError> {
    conn.query_row(
        &format!("SELECT {VM_COLUMNS} FROM virtual_machines WHERE id = ?1"),
        params![id],
        vm_from_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("virtual machine {id}")))
}

/// IPs already held by VMs of a zone.
pub(crate) fn zone_ips_tx(conn: &Connection, zone_id: i64) -> Result<Vec<String>, StoreError> {
    let mut stmt = conn.prepare("SELECT ip FROM virtual_machines WHERE zone_id = ?1")?;
    let ips = stmt
        .query_map(params![zone_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ips)
}

pub(crate) fn delete_zone_vms_tx(conn: &Connection, zone_id: i64) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM virtual_machines WHERE zone_id = ?1",
        params![zone_id],
    )?)
}

pub(crate) fn insert_vm_tx(
    conn: &Connection,
    spec: &VmSpec,
    zone_id: i64,
    ip: Ipv4Addr,
) -> Result<VirtualMachine, StoreError> {
    let ip = ip.to_string();
    conn.execute(
        r#"
        INSERT INTO virtual_machines
            (hostname, role_tags, tier, ip, cpu, ram, os_disk, data_disk, zone_id, status)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            spec.hostname,
            spec.role_tags.join(","),
            spec.vm_type.as_str(),
            ip,
            spec.cpu,
            spec.ram,
            spec.os_disk,
            spec.data_disk,
            zone_id,
            VmStatus::ToCreate.as_str(),
        ],
    )?;

    Ok(VirtualMachine {
        id: conn.last_insert_rowid(),
        hostname: spec.hostname.clone(),
        role_tags: spec.role_tags.clone(),
        tier: spec.vm_type,
        ip,
        cpu: spec.cpu,
        ram: spec.ram,
        os_disk: spec.os_disk,
        data_disk: spec.data_disk,
        zone_id,
        status: VmStatus::ToCreate,
    })
}

pub(crate) fn update_vm_tx(
    conn: &Connection,
    id: i64,
    update: &VmUpdate,
) -> Result<VirtualMachine, StoreError> {
    let mut vm = get_vm_tx(conn, id)?;

    if let Some(ip) = update.ip.as_deref().filter(|ip| *ip != vm.ip) {
        let addr = parse_ipv4(ip).map_err(|e| StoreError::Invalid(e.to_string()))?;
        let zone = get_zone_tx(conn, vm.zone_id)?;
        if let Ok(pool) = ipam::zone_pool(&zone) {
            if !pool.contains(addr) {
                return Err(StoreError::Invalid(format!(
                    "{addr} is outside the pool of zone '{}' ({pool})",
                    zone.name
                )));
            }
        }
        let held: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM virtual_machines WHERE zone_id = ?1 AND ip = ?2 AND id != ?3)",
            params![vm.zone_id, addr.to_string(), id],
            |row| row.get(0),
        )?;
        if held {
            return Err(StoreError::Conflict(format!(
                "{addr} is already assigned in zone '{}'",
                zone.name
            )));
        }
        vm.ip = addr.to_string();
    }
    if let Some(hostname) = &update.hostname {
        vm.hostname = hostname.clone();
    }
    if let Some(tier) = update.tier.filter(|tier| *tier != vm.tier) {
        check_tier_change(conn, &vm, tier)?;
        vm.tier = tier;
    }
    if let Some(status) = update.status {
        vm.status = status;
    }

    conn.execute(
        "UPDATE virtual_machines SET hostname = ?1, ip = ?2, tier = ?3, status = ?4 WHERE id = ?5",
        params![vm.hostname, vm.ip, vm.tier.as_str(), vm.status.as_str(), id],
    )?;
    Ok(vm)
}

/// A tier change must keep the VM in its tier's zone, keep pinned tiers at
/// their node count, and never give a load balancer a data disk.
fn check_tier_change(conn: &Connection, vm: &VirtualMachine, to: VmType) -> Result<(), StoreError> {
    let zone = get_zone_tx(conn, vm.zone_id)?;
    if to.zone() != zone.name {
        return Err(StoreError::Invalid(format!(
            "{to} VMs belong in zone '{}', not '{}'",
            to.zone(),
            zone.name
        )));
    }
    if to.is_load_balancer() && vm.data_disk > 0 {
        return Err(StoreError::Invalid(format!(
            "{to} VMs carry no data disk; '{}' has {} GiB",
            vm.hostname, vm.data_disk
        )));
    }

    let count = |tier: VmType| -> Result<u32, StoreError> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM virtual_machines WHERE tier = ?1",
            params![tier.as_str()],
            |row| row.get(0),
        )?)
    };
    for (tier, after) in [(vm.tier, count(vm.tier)?.saturating_sub(1)), (to, count(to)? + 1)] {
        if let Some(fixed) = tier.fixed_node_count() {
            if after != fixed {
                return Err(StoreError::Invalid(format!(
                    "{tier} must keep exactly {fixed} nodes"
                )));
            }
        }
    }
    Ok(())
}

// =============================================================================
// Shared services
// =============================================================================

/// Class of service the deployment integrates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SharedServiceKind {
    SecretStore,
    SourceRegistry,
    Directory,
    Database,
    Messaging,
}

impl SharedServiceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecretStore => "secret_store",
            Self::SourceRegistry => "source_registry",
            Self::Directory => "directory",
            Self::Database => "database",
            Self::Messaging => "messaging",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "secret_store" => Some(Self::SecretStore),
            "source_registry" => Some(Self::SourceRegistry),
            "directory" => Some(Self::Directory),
            "database" => Some(Self::Database),
            "messaging" => Some(Self::Messaging),
            _ => None,
        }
    }
}

/// External service reachable from the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedService {
    pub id: i64,
    pub kind: SharedServiceKind,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub protocol: String,
}

/// Shared service definition loaded at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewSharedService {
    pub kind: SharedServiceKind,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

pub(crate) fn list_shared_services_tx(
    conn: &Connection,
) -> Result<Vec<SharedService>, StoreError> {
    let mut stmt =
        conn.prepare("SELECT id, kind, name, host, port, protocol FROM shared_services ORDER BY id")?;
    let rows = stmt
        .query_map([], |row| {
            let kind: String = row.get(1)?;
            Ok((row.get::<_, i64>(0)?, kind, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
        })?
        .collect::<Result<Vec<(i64, String, String, String, u16, String)>, _>>()?;

    rows.into_iter()
        .map(|(id, kind, name, host, port, protocol)| {
            let kind = SharedServiceKind::from_str(&kind)
                .ok_or_else(|| StoreError::Invalid(format!("shared service kind '{kind}'")))?;
            Ok(SharedService {
                id,
                kind,
                name,
                host,
                port,
                protocol,
            })
        })
        .collect()
}

// =============================================================================
// Derived records
// =============================================================================

/// Name-resolution record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DnsRecord {
    pub name: String,
    pub hostname: String,
    pub ip: String,
}

/// Network-flow permission between two endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowRule {
    /// Row id; 0 until persisted. Reassigned whenever the set is recomputed.
    pub id: i64,
    pub source: String,
    pub destination: String,
    pub port: u16,
    pub protocol: String,
    pub is_open: bool,
    pub description: String,
}

/// Identity of a flow across recomputations.
pub(crate) type FlowKey = (String, String, u16, String);

impl FlowRule {
    pub(crate) fn key(&self) -> FlowKey {
        (
            self.source.clone(),
            self.destination.clone(),
            self.port,
            self.protocol.clone(),
        )
    }
}

const FLOW_COLUMNS: &str = "id, source, destination, port, protocol, is_open, description";

fn flow_from_row(row: &Row<'_>) -> rusqlite::Result<FlowRule> {
    Ok(FlowRule {
        id: row.get(0)?,
        source: row.get(1)?,
        destination: row.get(2)?,
        port: row.get(3)?,
        protocol: row.get(4)?,
        is_open: row.get(5)?,
        description: row.get(6)?,
    })
}

/// Keys of the flows currently marked open.
pub(crate) fn open_flow_keys_tx(conn: &Connection) -> Result<HashSet<FlowKey>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FLOW_COLUMNS} FROM flow_rules WHERE is_open = 1"
    ))?;
    let keys = stmt
        .query_map([], flow_from_row)?
        .map(|flow| flow.map(|f| f.key()))
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(keys)
}

pub(crate) fn replace_derived_tx(
    conn: &Connection,
    dns: &[DnsRecord],
    flows: &[FlowRule],
) -> Result<(), StoreError> {
    conn.execute_batch("DELETE FROM dns_records; DELETE FROM flow_rules;")?;

    let mut insert_dns =
        conn.prepare("INSERT INTO dns_records (name, hostname, ip) VALUES (?1, ?2, ?3)")?;
    for record in dns {
        insert_dns.execute(params![record.name, record.hostname, record.ip])?;
    }

    let mut insert_flow = conn.prepare(
        "INSERT INTO flow_rules (source, destination, port, protocol, is_open, description)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for flow in flows {
        insert_flow.execute(params![
            flow.source,
            flow.destination,
            flow.port,
            flow.protocol,
            flow.is_open,
            flow.description,
        ])?;
    }
    Ok(())
}

// =============================================================================
// Store API
// =============================================================================

impl Store {
    /// Insert settings if none exist yet; returns the persisted row.
    pub fn seed_settings(&self, defaults: &Settings) -> Result<Settings, StoreError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR IGNORE INTO settings (id, scale, base_domain, env_prefix, monitoring_enabled)
                 VALUES (1, ?1, ?2, ?3, ?4)",
                params![
                    defaults.scale,
                    defaults.base_domain,
                    defaults.env_prefix,
                    defaults.monitoring_enabled,
                ],
            )?;
            get_settings_tx(conn)
        })
    }

    pub fn get_settings(&self) -> Result<Settings, StoreError> {
        self.with_conn(get_settings_tx)
    }

    pub fn update_settings(&self, update: &SettingsUpdate) -> Result<Settings, StoreError> {
        self.with_tx(|tx| {
            let mut settings = get_settings_tx(tx)?;
            if let Some(domain) = &update.base_domain {
                settings.base_domain = domain.clone();
            }
            if let Some(env) = &update.env_prefix {
                settings.env_prefix = env.clone();
            }
            if let Some(enabled) = update.monitoring_enabled {
                settings.monitoring_enabled = enabled;
            }
            tx.execute(
                "UPDATE settings SET base_domain = ?1, env_prefix = ?2, monitoring_enabled = ?3 WHERE id = 1",
                params![
                    settings.base_domain,
                    settings.env_prefix,
                    settings.monitoring_enabled
                ],
            )?;
            Ok(settings)
        })
    }

    /// Insert zones whose name is not yet known. Existing zones are left as is.
    pub fn seed_zones(&self, zones: &[NewZone]) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            for zone in zones {
                let draft = Zone {
                    id: 0,
                    name: zone.name.clone(),
                    subnet: zone.subnet.clone(),
                    mask: zone.mask,
                    gateway: zone.gateway.clone(),
                    dns: zone.dns.clone(),
                    domain: zone.domain.clone(),
                    ip_pool_start: zone.ip_pool_start.clone(),
                    ip_pool_end: zone.ip_pool_end.clone(),
                    hypervisor_ref: zone.hypervisor_ref.clone(),
                };
                validate_zone_network(&draft)?;
                tx.execute(
                    r#"
                    INSERT OR IGNORE INTO zones
                        (name, subnet, mask, gateway, dns, domain, ip_pool_start, ip_pool_end, hypervisor_ref)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                    params![
                        draft.name,
                        draft.subnet,
                        draft.mask,
                        draft.gateway,
                        draft.dns,
                        draft.domain,
                        draft.ip_pool_start,
                        draft.ip_pool_end,
                        draft.hypervisor_ref,
                    ],
                )?;
            }
            Ok(())
        })
    }

    pub fn list_zones(&self) -> Result<Vec<Zone>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("SELECT {ZONE_COLUMNS} FROM zones ORDER BY id"))?;
            let zones = stmt
                .query_map([], zone_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(zones)
        })
    }

    pub fn get_zone(&self, id: i64) -> Result<Zone, StoreError> {
        self.with_conn(|conn| get_zone_tx(conn, id))
    }

    pub fn zone_by_name(&self, name: &str) -> Result<Zone, StoreError> {
        self.with_conn(|conn| {
            zone_by_name_tx(conn, name)?
                .ok_or_else(|| StoreError::NotFound(format!("zone '{name}'")))
        })
    }

    /// Update zone network settings; the resulting pool must sit inside the subnet.
    pub fn update_zone(&self, id: i64, update: &ZoneUpdate) -> Result<Zone, StoreError> {
        self.with_tx(|tx| {
            let mut zone = get_zone_tx(tx, id)?;
            if let Some(v) = &update.subnet {
                zone.subnet = v.clone();
            }
            if let Some(v) = update.mask {
                zone.mask = v;
            }
            if let Some(v) = &update.gateway {
                zone.gateway = v.clone();
            }
            if let Some(v) = &update.dns {
                zone.dns = v.clone();
            }
            if let Some(v) = &update.domain {
                zone.domain = v.clone();
            }
            if let Some(v) = &update.ip_pool_start {
                zone.ip_pool_start = Some(v.clone());
            }
            if let Some(v) = &update.ip_pool_end {
                zone.ip_pool_end = Some(v.clone());
            }
            if let Some(v) = &update.hypervisor_ref {
                zone.hypervisor_ref = Some(v.clone());
            }
            validate_zone_network(&zone)?;

            tx.execute(
                r#"
                UPDATE zones SET subnet = ?1, mask = ?2, gateway = ?3, dns = ?4, domain = ?5,
                    ip_pool_start = ?6, ip_pool_end = ?7, hypervisor_ref = ?8
                WHERE id = ?9
                "#,
                params![
                    zone.subnet,
                    zone.mask,
                    zone.gateway,
                    zone.dns,
                    zone.domain,
                    zone.ip_pool_start,
                    zone.ip_pool_end,
                    zone.hypervisor_ref,
                    id,
                ],
            )?;
            Ok(zone)
        })
    }

    /// All VMs, optionally restricted to one tier, ascending by id.
    pub fn list_vms(&self, tier: Option<VmType>) -> Result<Vec<VirtualMachine>, StoreError> {
        self.with_conn(|conn| list_vms_tx(conn, tier))
    }

    pub fn get_vm(&self, id: i64) -> Result<VirtualMachine, StoreError> {
        self.with_conn(|conn| get_vm_tx(conn, id))
    }

    /// Replace the shared service catalogue.
    pub fn replace_shared_services(&self, services: &[NewSharedService]) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM shared_services", [])?;
            for service in services {
                tx.execute(
                    "INSERT INTO shared_services (kind, name, host, port, protocol) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        service.kind.as_str(),
                        service.name,
                        service.host,
                        service.port,
                        service.protocol,
                    ],
                )?;
            }
            Ok(())
        })
    }

    pub fn list_shared_services(&self) -> Result<Vec<SharedService>, StoreError> {
        self.with_conn(list_shared_services_tx)
    }

    pub fn list_dns(&self) -> Result<Vec<DnsRecord>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT name, hostname, ip FROM dns_records ORDER BY id")?;
            let records = stmt
                .query_map([], |row| {
                    Ok(DnsRecord {
                        name: row.get(0)?,
                        hostname: row.get(1)?,
                        ip: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(records)
        })
    }

    pub fn list_flows(&self) -> Result<Vec<FlowRule>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {FLOW_COLUMNS} FROM flow_rules ORDER BY id"))?;
            let flows = stmt
                .query_map([], flow_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(flows)
        })
    }

    /// Mark a flow as opened (or closed again) on the network side.
    pub fn set_flow_open(&self, id: i64, is_open: bool) -> Result<FlowRule, StoreError> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE flow_rules SET is_open = ?1 WHERE id = ?2",
                params![is_open, id],
            )?;
            if changed == 0 {
                return Err(StoreError::NotFound(format!("flow {id}")));
            }
            Ok(conn.query_row(
                &format!("SELECT {FLOW_COLUMNS} FROM flow_rules WHERE id = ?1"),
                params![id],
                flow_from_row,
            )?)
        })
    }

    /// Store the secret store's unseal key shares and root token, replacing any previous set.
    pub fn replace_vault_credentials(
        &self,
        keys: &[String],
        root_token: &str,
    ) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            tx.execute("DELETE FROM vault_credentials", [])?;
            for key in keys {
                tx.execute(
                    "INSERT INTO vault_credentials (kind, value) VALUES ('key', ?1)",
                    params![key],
                )?;
            }
            tx.execute(
                "INSERT INTO vault_credentials (kind, value) VALUES ('token', ?1)",
                params![root_token],
            )?;
            Ok(())
        })
    }

    pub fn vault_root_token(&self) -> Result<Option<String>, StoreError> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT value FROM vault_credentials WHERE kind = 'token' ORDER BY id LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    pub fn vault_unseal_keys(&self) -> Result<Vec<String>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT value FROM vault_credentials WHERE kind = 'key' ORDER BY id")?;
            let keys = stmt
                .query_map([], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()?;
            Ok(keys)
        })
    }
}
