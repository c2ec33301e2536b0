//! Networking utilities for zone address management.
//!
//! This library provides helpers for:
//! - Converting dotted IPv4 addresses to and from 32-bit integers
//! - Inclusive IPv4 address pools with first-free allocation
//! - Subnet membership checks for zone configuration

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::str::FromStr;

use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// Invalid CIDR prefix or mask.
    #[error("invalid CIDR prefix: {0}")]
    InvalidPrefix(String),

    /// Pool bounds are inverted or outside the subnet.
    #[error("invalid address pool: {0}")]
    InvalidPool(String),

    /// Address pool exhausted.
    #[error("address pool exhausted: {0}")]
    PoolExhausted(String),
}

// ============================================================================
// Conversion
// ============================================================================

/// Parse a dotted-quad address into its 32-bit big-endian value.
pub fn ip_to_int(addr: &str) -> Result<u32, NetworkError> {
    let parsed = Ipv4Addr::from_str(addr.trim())
        .map_err(|_| NetworkError::InvalidAddress(addr.to_string()))?;
    Ok(u32::from(parsed))
}

/// Render a 32-bit value as a dotted-quad address.
pub fn int_to_ip(value: u32) -> String {
    Ipv4Addr::from(value).to_string()
}

/// Parse an address string into an [`Ipv4Addr`].
pub fn parse_ipv4(addr: &str) -> Result<Ipv4Addr, NetworkError> {
    Ipv4Addr::from_str(addr.trim()).map_err(|_| NetworkError::InvalidAddress(addr.to_string()))
}

// ============================================================================
// Subnets
// ============================================================================

/// IPv4 subnet (network address plus prefix length).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Subnet {
    /// Network address, already masked.
    pub network: Ipv4Addr,

    /// Prefix length (e.g., 24 for /24).
    pub prefix_len: u8,
}

impl Ipv4Subnet {
    /// Create a subnet, masking the address to the prefix.
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self, NetworkError> {
        if prefix_len > 32 {
            return Err(NetworkError::InvalidPrefix(format!(
                "prefix length {} exceeds 32",
                prefix_len
            )));
        }

        Ok(Self {
            network: mask_ipv4(address, prefix_len),
            prefix_len,
        })
    }

    /// Parse from CIDR notation (e.g., "10.0.1.0/24").
    pub fn from_cidr(s: &str) -> Result<Self, NetworkError> {
        let Some((addr_str, prefix_str)) = s.split_once('/') else {
            return Err(NetworkError::InvalidPrefix(format!(
                "missing '/' in CIDR: {}",
                s
            )));
        };

        let address = parse_ipv4(addr_str)?;
        let prefix_len = prefix_str
            .parse::<u8>()
            .map_err(|_| NetworkError::InvalidPrefix(prefix_str.to_string()))?;

        Self::new(address, prefix_len)
    }

    /// Check if an address is within this subnet.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        mask_ipv4(addr, self.prefix_len) == self.network
    }

    /// Number of addresses in this subnet.
    pub fn size(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix_len))
    }
}

impl std::fmt::Display for Ipv4Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix_len)
    }
}

fn mask_ipv4(addr: Ipv4Addr, prefix_len: u8) -> Ipv4Addr {
    let bits = u32::from(addr);
    let mask = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len.min(32)))
    };
    Ipv4Addr::from(bits & mask)
}

// ============================================================================
// Pools
// ============================================================================

/// Contiguous inclusive IPv4 range reserved for one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Pool {
    start: u32,
    end: u32,
}

impl Ipv4Pool {
    /// Create a pool from inclusive bounds.
    pub fn new(start: Ipv4Addr, end: Ipv4Addr) -> Result<Self, NetworkError> {
        let (start, end) = (u32::from(start), u32::from(end));
        if start > end {
            return Err(NetworkError::InvalidPool(format!(
                "start {} is after end {}",
                int_to_ip(start),
                int_to_ip(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse a pool from dotted-quad bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, NetworkError> {
        Self::new(parse_ipv4(start)?, parse_ipv4(end)?)
    }

    /// First address of the pool.
    pub fn start(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.start)
    }

    /// Last address of the pool (inclusive).
    pub fn end(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.end)
    }

    /// Check if an address is within the pool.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        (self.start..=self.end).contains(&u32::from(addr))
    }

    /// Number of addresses in the pool.
    pub fn size(&self) -> u64 {
        u64::from(self.end - self.start) + 1
    }

    /// Check that both bounds fall inside `subnet`.
    pub fn ensure_within(&self, subnet: &Ipv4Subnet) -> Result<(), NetworkError> {
        if subnet.contains(self.start()) && subnet.contains(self.end()) {
            Ok(())
        } else {
            Err(NetworkError::InvalidPool(format!(
                "{self} is not inside {subnet}"
            )))
        }
    }

    /// Return the lowest pool address not present in `taken`.
    ///
    /// Addresses in `taken` outside the pool are ignored.
    pub fn first_free<I>(&self, taken: I) -> Result<Ipv4Addr, NetworkError>
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        let taken: HashSet<u32> = taken
            .into_iter()
            .map(u32::from)
            .filter(|v| (self.start..=self.end).contains(v))
            .collect();

        (self.start..=self.end)
            .find(|candidate| !taken.contains(candidate))
            .map(Ipv4Addr::from)
            .ok_or_else(|| NetworkError::PoolExhausted(self.to_string()))
    }
}

impl std::fmt::Display for Ipv4Pool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.start(), self.end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_ip_to_int_known_value() {
        assert_eq!(ip_to_int("192.168.1.1").unwrap(), 3232235777);
        assert_eq!(int_to_ip(3232235777), "192.168.1.1");
    }

    #[rstest]
    #[case("0.0.0.0", 0)]
    #[case("255.255.255.255", u32::MAX)]
    #[case("10.0.0.1", 167772161)]
    fn test_ip_to_int_edges(#[case] addr: &str, #[case] expected: u32) {
        assert_eq!(ip_to_int(addr).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("256.1.1.1")]
    #[case("10.0.0")]
    #[case("not-an-ip")]
    fn test_ip_to_int_rejects_garbage(#[case] addr: &str) {
        assert!(matches!(
            ip_to_int(addr),
            Err(NetworkError::InvalidAddress(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_int_ip_round_trip(value in any::<u32>()) {
            prop_assert_eq!(ip_to_int(&int_to_ip(value)).unwrap(), value);
        }
    }

    #[test]
    fn test_subnet_contains() {
        let subnet = Ipv4Subnet::from_cidr("10.0.1.17/24").unwrap();
        assert_eq!(subnet.network, Ipv4Addr::new(10, 0, 1, 0));
        assert_eq!(subnet.size(), 256);
        assert!(subnet.contains(Ipv4Addr::new(10, 0, 1, 200)));
        assert!(!subnet.contains(Ipv4Addr::new(10, 0, 2, 1)));
    }

    #[test]
    fn test_subnet_rejects_long_prefix() {
        assert!(Ipv4Subnet::from_cidr("10.0.0.0/33").is_err());
    }

    #[test]
    fn test_pool_rejects_inverted_bounds() {
        assert!(matches!(
            Ipv4Pool::parse("10.0.0.20", "10.0.0.10"),
            Err(NetworkError::InvalidPool(_))
        ));
    }

    #[test]
    fn test_pool_sequential_allocation() {
        let pool = Ipv4Pool::parse("10.0.0.10", "10.0.0.12").unwrap();
        let mut taken = Vec::new();

        for expected in ["10.0.0.10", "10.0.0.11", "10.0.0.12"] {
            let addr = pool.first_free(taken.iter().copied()).unwrap();
            assert_eq!(addr.to_string(), expected);
            taken.push(addr);
        }

        assert!(matches!(
            pool.first_free(taken.iter().copied()),
            Err(NetworkError::PoolExhausted(_))
        ));
    }

    #[test]
    fn test_pool_fills_gaps_first() {
        let pool = Ipv4Pool::parse("10.0.0.10", "10.0.0.20").unwrap();
        let taken = [
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 12),
            Ipv4Addr::new(192, 168, 0, 1),
        ];
        assert_eq!(
            pool.first_free(taken).unwrap(),
            Ipv4Addr::new(10, 0, 0, 11)
        );
    }

    #[test]
    fn test_pool_at_top_of_address_space() {
        let pool = Ipv4Pool::parse("255.255.255.254", "255.255.255.255").unwrap();
        assert_eq!(pool.size(), 2);
        let taken = [Ipv4Addr::new(255, 255, 255, 254)];
        assert_eq!(pool.first_free(taken).unwrap(), Ipv4Addr::BROADCAST);
    }

    #[test]
    fn test_pool_within_subnet() {
        let subnet = Ipv4Subnet::from_cidr("10.0.1.0/24").unwrap();
        assert!(Ipv4Pool::parse("10.0.1.10", "10.0.1.90")
            .unwrap()
            .ensure_within(&subnet)
            .is_ok());
        assert!(Ipv4Pool::parse("10.0.1.10", "10.0.2.5")
            .unwrap()
            .ensure_within(&subnet)
            .is_err());
    }

    proptest! {
        #[test]
        fn prop_first_free_is_in_pool_and_untaken(
            start in 0u32..u32::MAX - 64,
            len in 0u32..32,
            taken_offsets in proptest::collection::vec(0u32..40, 0..40),
        ) {
            let pool = Ipv4Pool::new(Ipv4Addr::from(start), Ipv4Addr::from(start + len)).unwrap();
            let taken: Vec<Ipv4Addr> = taken_offsets
                .iter()
                .map(|o| Ipv4Addr::from(start + o))
                .collect();

            match pool.first_free(taken.iter().copied()) {
                Ok(addr) => {
                    prop_assert!(pool.contains(addr));
                    prop_assert!(!taken.contains(&addr));
                }
                Err(NetworkError::PoolExhausted(_)) => {
                    for offset in 0..=len {
                        prop_assert!(taken.contains(&Ipv4Addr::from(start + offset)));
                    }
                }
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
    }
}
