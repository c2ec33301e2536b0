//! SQLite-backed store for inventory and run state.
//!
//! One [`Store`] handle is constructed at process start and cloned into
//! every component. All access goes through a single connection guarded by
//! a mutex, so a multi-statement operation executed inside
//! [`Store::with_tx`] is never interleaved with another writer.

mod error;
pub mod inventory;
pub mod runs;

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, Transaction};
use tracing::debug;

pub use error::StoreError;
pub use inventory::{
    DnsRecord, FlowRule, NewSharedService, NewZone, Settings, SettingsUpdate, SharedService,
    SharedServiceKind, VirtualMachine, VmStatus, VmUpdate, Zone, ZoneUpdate,
};
pub use runs::{DeploymentUnit, UnitLogEntry};

/// Shared store handle.
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        init_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Check that the connection answers queries.
    pub fn health_check(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` against the connection while holding the store lock.
    pub fn with_conn<T, E>(&self, f: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` inside one transaction; it commits only if `f` succeeds.
    pub fn with_tx<T, E>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<StoreError>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(StoreError::from)?;
        let out = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(out)
    }
}

fn init_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            scale INTEGER NOT NULL,
            base_domain TEXT NOT NULL,
            env_prefix TEXT NOT NULL,
            monitoring_enabled INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS zones (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            subnet TEXT NOT NULL,
            mask INTEGER NOT NULL,
            gateway TEXT NOT NULL,
            dns TEXT NOT NULL,
            domain TEXT NOT NULL,
            ip_pool_start TEXT,
            ip_pool_end TEXT,
            hypervisor_ref TEXT
        );

        CREATE TABLE IF NOT EXISTS virtual_machines (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            hostname TEXT NOT NULL,
            role_tags TEXT NOT NULL,
            tier TEXT NOT NULL,
            ip TEXT NOT NULL,
            cpu INTEGER NOT NULL,
            ram INTEGER NOT NULL,
            os_disk INTEGER NOT NULL,
            data_disk INTEGER NOT NULL,
            zone_id INTEGER NOT NULL REFERENCES zones(id),
            status TEXT NOT NULL DEFAULT 'to_create',
            UNIQUE (zone_id, ip)
        );

        CREATE INDEX IF NOT EXISTS idx_vms_tier ON virtual_machines(tier);

        CREATE TABLE IF NOT EXISTS shared_services (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            name TEXT NOT NULL,
            host TEXT NOT NULL,
            port INTEGER NOT NULL,
            protocol TEXT NOT NULL DEFAULT 'tcp'
        );

        CREATE TABLE IF NOT EXISTS dns_records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            hostname TEXT NOT NULL,
            ip TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS flow_rules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source TEXT NOT NULL,
            destination TEXT NOT NULL,
            port INTEGER NOT NULL,
            protocol TEXT NOT NULL,
            is_open INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS deployment_units (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            unit_order INTEGER NOT NULL UNIQUE,
            status TEXT NOT NULL,
            correlation_id TEXT,
            start_time INTEGER,
            end_time INTEGER
        );

        CREATE TABLE IF NOT EXISTS unit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            correlation_id TEXT NOT NULL,
            event TEXT NOT NULL,
            task TEXT NOT NULL,
            stdout TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_unit_logs_correlation ON unit_logs(correlation_id, id);

        CREATE TABLE IF NOT EXISTS vault_credentials (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            value TEXT NOT NULL
        );
        "#,
    )?;

    debug!("Store schema initialized");
    Ok(())
}
