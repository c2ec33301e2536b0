use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::db::{NewSharedService, NewZone, Settings};
use crate::deploy::sequencer::DEFAULT_WORKERS;
use crate::deploy::DEFAULT_UNITS;
use crate::topology::{zones, SizingTable, TierSizing};

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub db_path: PathBuf,
    pub workdir: PathBuf,
    pub topology_file: Option<PathBuf>,
    pub engine: EngineConfig,
    pub units: Vec<String>,
    /// Seeded into the settings row on first start.
    pub defaults: Settings,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub workers: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let listen_addr = var("STRATUM_LISTEN_ADDR")
            .unwrap_or_else(|| "127.0.0.1:8080".to_string())
            .parse()
            .context("invalid STRATUM_LISTEN_ADDR")?;

        let log_level = var("STRATUM_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let db_path = var("STRATUM_DB_PATH")
            .unwrap_or_else(|| "stratum.db".to_string())
            .into();

        let workdir = var("STRATUM_WORKDIR")
            .unwrap_or_else(|| "./work".to_string())
            .into();

        let topology_file = var("STRATUM_TOPOLOGY_FILE")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let engine = EngineConfig {
            command: var("STRATUM_ENGINE_COMMAND")
                .unwrap_or_else(|| "stratum-engine".to_string())
                .into(),
            args: var("STRATUM_ENGINE_ARGS")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            workers: match var("STRATUM_ENGINE_WORKERS") {
                Some(v) => v.parse().context("invalid STRATUM_ENGINE_WORKERS")?,
                None => DEFAULT_WORKERS,
            },
        };

        let units = match var("STRATUM_UNITS") {
            Some(v) => split_list(&v),
            None => DEFAULT_UNITS.iter().map(|u| u.to_string()).collect(),
        };

        let defaults = Settings {
            scale: match var("STRATUM_SCALE") {
                Some(v) => v.parse().context("invalid STRATUM_SCALE")?,
                None => 100,
            },
            base_domain: var("STRATUM_BASE_DOMAIN").unwrap_or_else(|| "example.local".to_string()),
            env_prefix: var("STRATUM_ENV_PREFIX").unwrap_or_default(),
            monitoring_enabled: var("STRATUM_MONITORING")
                .map(|v| v == "1" || v.to_lowercase() == "true")
                .unwrap_or(false),
        };

        Ok(Self {
            listen_addr,
            log_level,
            db_path,
            workdir,
            topology_file,
            engine,
            units,
            defaults,
        })
    }

    /// Load the configured topology file, or the built-in layout.
    pub fn topology(&self) -> Result<TopologyFile> {
        match &self.topology_file {
            Some(path) => TopologyFile::load(path),
            None => Ok(TopologyFile::builtin()),
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Zones, shared services and optional sizing overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TopologyFile {
    #[serde(default)]
    pub zones: Vec<NewZone>,
    #[serde(default)]
    pub shared_services: Vec<NewSharedService>,
    #[serde(default)]
    pub sizing: Vec<TierSizing>,
}

impl TopologyFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read topology file {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("invalid topology file {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let mut file: Self = toml::from_str(raw)?;
        if file.zones.is_empty() {
            file.zones = builtin_zones();
        }
        Ok(file)
    }

    pub fn builtin() -> Self {
        Self {
            zones: builtin_zones(),
            ..Self::default()
        }
    }

    /// Sizing table from the file's rows, or the built-in one.
    pub fn sizing_table(&self) -> Result<SizingTable> {
        if self.sizing.is_empty() {
            return Ok(SizingTable::builtin());
        }
        SizingTable::new(self.sizing.clone()).context("invalid sizing rows")
    }
}

fn builtin_zones() -> Vec<NewZone> {
    [(zones::APPS, 10), (zones::INFRA, 20), (zones::DMZ, 30)]
        .into_iter()
        .map(|(name, octet)| NewZone {
            name: name.to_string(),
            subnet: format!("10.{octet}.0.0"),
            mask: 24,
            gateway: format!("10.{octet}.0.1"),
            dns: format!("10.{octet}.0.2"),
            domain: "example.local".to_string(),
            ip_pool_start: Some(format!("10.{octet}.0.10")),
            ip_pool_end: Some(format!("10.{octet}.0.250")),
            hypervisor_ref: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::db::SharedServiceKind;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.engine.workers, DEFAULT_WORKERS);
        assert_eq!(config.units.len(), DEFAULT_UNITS.len());
        assert_eq!(config.defaults.scale, 100);
        assert!(!config.defaults.monitoring_enabled);
        assert!(config.topology_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("STRATUM_UNITS", "prepare-vms, install-vault,,"),
            ("STRATUM_ENGINE_ARGS", "run --quiet"),
            ("STRATUM_ENGINE_WORKERS", "2"),
            ("STRATUM_SCALE", "1000"),
            ("STRATUM_ENV_PREFIX", "prod"),
            ("STRATUM_MONITORING", "TRUE"),
        ]))
        .unwrap();

        assert_eq!(config.units, vec!["prepare-vms", "install-vault"]);
        assert_eq!(config.engine.args, vec!["run", "--quiet"]);
        assert_eq!(config.engine.workers, 2);
        assert_eq!(config.defaults.scale, 1000);
        assert_eq!(config.defaults.name_prefix(), "prod-");
        assert!(config.defaults.monitoring_enabled);
    }

    #[test]
    fn test_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("STRATUM_LISTEN_ADDR", "nope")])).is_err());
        assert!(Config::from_lookup(lookup(&[("STRATUM_SCALE", "many")])).is_err());
    }

    #[test]
    fn test_topology_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.toml");
        std::fs::write(
            &path,
            r#"
[[zones]]
name = "apps"
subnet = "192.168.10.0"
mask = 24
gateway = "192.168.10.1"
dns = "192.168.10.2"
domain = "corp.local"
ip_pool_start = "192.168.10.50"
ip_pool_end = "192.168.10.99"

[[shared_services]]
kind = "directory"
name = "ldap"
host = "192.168.1.5"
port = 636
protocol = "tcp"
"#,
        )
        .unwrap();

        let file = TopologyFile::load(&path).unwrap();
        assert_eq!(file.zones.len(), 1);
        assert_eq!(file.zones[0].ip_pool_end.as_deref(), Some("192.168.10.99"));
        assert_eq!(file.shared_services[0].kind, SharedServiceKind::Directory);
        assert_eq!(file.sizing_table().unwrap().scales(), vec![100, 500, 1000, 10000]);
    }

    #[test]
    fn test_builtin_topology() {
        let file = TopologyFile::parse("").unwrap();
        let names: Vec<_> = file.zones.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, zones::ALL.to_vec());
    }

    #[test]
    fn test_invalid_sizing_rows_rejected() {
        let file = TopologyFile::parse(
            r#"
[[sizing]]
scale_tier = 50
vm_type = "LBLAN"
node_count = 3
cpu_per_node = 2
ram_per_node = 2048
os_disk_size = 60
data_disk_size = 0
role_tags = ["loadbalancer"]
"#,
        )
        .unwrap();
        assert!(file.sizing_table().is_err());
    }
}
