//! Per-zone IPv4 address allocation.
//!
//! Allocation reads the zone's taken addresses and picks the lowest free one
//! in the pool. Callers allocate and insert inside one [`Store::with_tx`]
//! closure; the store lock serializes those closures, so two allocations in
//! the same zone can never observe the same free address. The
//! `UNIQUE (zone_id, ip)` constraint backs this up at the schema level.

use std::net::Ipv4Addr;

use rusqlite::Connection;
use stratum_networking::{parse_ipv4, Ipv4Pool, NetworkError};
use tracing::debug;

use crate::db::{inventory, Store, Zone};
use crate::topology::TopologyError;

/// Parse the zone's configured pool bounds.
pub fn zone_pool(zone: &Zone) -> Result<Ipv4Pool, TopologyError> {
    let not_configured = |reason: String| TopologyError::PoolNotConfigured {
        zone: zone.name.clone(),
        reason,
    };

    let (Some(start), Some(end)) = (&zone.ip_pool_start, &zone.ip_pool_end) else {
        return Err(not_configured("pool bounds are not set".to_string()));
    };

    Ipv4Pool::parse(start, end).map_err(|e| not_configured(e.to_string()))
}

/// Lowest free pool address of `zone`, read through `conn`.
pub(crate) fn allocate_tx(conn: &Connection, zone: &Zone) -> Result<Ipv4Addr, TopologyError> {
    let pool = zone_pool(zone)?;
    let taken = inventory::zone_ips_tx(conn, zone.id)?
        .iter()
        .filter_map(|ip| parse_ipv4(ip).ok())
        .collect::<Vec<_>>();

    let addr = pool.first_free(taken).map_err(|e| match e {
        NetworkError::PoolExhausted(_) => TopologyError::PoolExhausted {
            zone: zone.name.clone(),
            pool: pool.to_string(),
        },
        other => TopologyError::PoolNotConfigured {
            zone: zone.name.clone(),
            reason: other.to_string(),
        },
    })?;

    debug!(zone = %zone.name, ip = %addr, "Allocated address");
    Ok(addr)
}

/// Next free address of the named zone, without reserving it.
pub fn allocate(store: &Store, zone_name: &str) -> Result<Ipv4Addr, TopologyError> {
    store.with_conn(|conn| {
        let zone = inventory::zone_by_name_tx(conn, zone_name)?
            .ok_or_else(|| crate::db::StoreError::NotFound(format!("zone '{zone_name}'")))?;
        allocate_tx(conn, &zone)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::inventory::tests::zone;
    use crate::topology::{VmSpec, VmType};

    fn spec(n: u32) -> VmSpec {
        VmSpec {
            hostname: format!("rkeapp-worker{n}"),
            vm_type: VmType::RkeappsWorker,
            role_tags: vec!["worker".to_string()],
            cpu: 4,
            ram: 8192,
            os_disk: 80,
            data_disk: 0,
        }
    }

    /// Allocate and insert one VM in a single transaction.
    fn reserve(store: &Store, zone_name: &str, n: u32) -> Result<Ipv4Addr, TopologyError> {
        store.with_tx(|tx| {
            let zone = inventory::zone_by_name_tx(tx, zone_name)?.unwrap();
            let ip = allocate_tx(tx, &zone)?;
            inventory::insert_vm_tx(tx, &spec(n), zone.id, ip)?;
            Ok(ip)
        })
    }

    #[test]
    fn test_sequential_allocation_then_exhaustion() {
        let store = Store::open_in_memory().unwrap();
        store.seed_zones(&[zone("apps", 1, (10, 13))]).unwrap();

        let ips: Vec<String> = (1..=4)
            .map(|n| reserve(&store, "apps", n).unwrap().to_string())
            .collect();
        assert_eq!(ips, vec!["10.0.1.10", "10.0.1.11", "10.0.1.12", "10.0.1.13"]);

        assert!(matches!(
            reserve(&store, "apps", 5),
            Err(TopologyError::PoolExhausted { .. })
        ));
        assert!(matches!(
            allocate(&store, "apps"),
            Err(TopologyError::PoolExhausted { .. })
        ));
    }

    #[test]
    fn test_allocation_skips_held_addresses() {
        let store = Store::open_in_memory().unwrap();
        store.seed_zones(&[zone("infra", 2, (10, 20))]).unwrap();
        let infra = store.zone_by_name("infra").unwrap();

        store
            .with_tx(|tx| {
                inventory::insert_vm_tx(tx, &spec(1), infra.id, Ipv4Addr::new(10, 0, 2, 10))?;
                inventory::insert_vm_tx(tx, &spec(2), infra.id, Ipv4Addr::new(10, 0, 2, 12))?;
                Ok::<_, TopologyError>(())
            })
            .unwrap();

        assert_eq!(
            allocate(&store, "infra").unwrap(),
            Ipv4Addr::new(10, 0, 2, 11)
        );
    }

    #[test]
    fn test_zones_have_independent_pools() {
        let store = Store::open_in_memory().unwrap();
        store
            .seed_zones(&[zone("apps", 1, (10, 20)), zone("dmz", 3, (10, 20))])
            .unwrap();

        reserve(&store, "apps", 1).unwrap();
        assert_eq!(
            allocate(&store, "dmz").unwrap(),
            Ipv4Addr::new(10, 0, 3, 10)
        );
    }

    #[test]
    fn test_zone_without_pool() {
        let store = Store::open_in_memory().unwrap();
        let mut bare = zone("dmz", 3, (10, 20));
        bare.ip_pool_start = None;
        bare.ip_pool_end = None;
        store.seed_zones(&[bare]).unwrap();

        assert!(matches!(
            allocate(&store, "dmz"),
            Err(TopologyError::PoolNotConfigured { .. })
        ));
    }

    #[test]
    fn test_unknown_zone() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            allocate(&store, "nowhere"),
            Err(TopologyError::Store(crate::db::StoreError::NotFound(_)))
        ));
    }

    #[test]
    fn test_concurrent_reservations_never_collide() {
        let store = Store::open_in_memory().unwrap();
        store.seed_zones(&[zone("apps", 1, (10, 60))]).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..5)
                        .map(|i| reserve(&store, "apps", t * 10 + i).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<Ipv4Addr> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }
}
