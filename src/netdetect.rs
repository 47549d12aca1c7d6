use anyhow::Result;
use if_addrs::{get_if_addrs, IfAddr};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::ConfigError;

/// A sweep range written as `a.b.c.d/n`.
///
/// The base address is kept exactly as given (host bits are not masked off), so
/// `10.0.0.255/24` sweeps upward from `10.0.0.255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NetworkRange {
    base: Ipv4Addr,
    prefix: u8,
}

impl NetworkRange {
    pub fn new(base: Ipv4Addr, prefix: u8) -> Result<Self, ConfigError> {
        if !(1..=32).contains(&prefix) {
            return Err(ConfigError::InvalidNetworkRange(format!("{base}/{prefix}")));
        }
        Ok(Self { base, prefix })
    }

    pub fn base(&self) -> Ipv4Addr {
        self.base
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix
    }

    /// Number of addresses swept: `2^(32 - prefix) - 1`.
    pub fn host_count(&self) -> u64 {
        (1u64 << (32 - u32::from(self.prefix))) - 1
    }

    /// Fresh iterator over the swept addresses; every call yields the same sequence.
    pub fn iter(&self) -> AddressRange {
        AddressRange {
            base: u32::from(self.base),
            offset: 0,
            count: self.host_count(),
        }
    }
}

impl FromStr for NetworkRange {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidNetworkRange(s.to_string());
        // Ipv4Net accepts /0; the sweep does not.
        let net = Ipv4Net::from_str(s.trim()).map_err(|_| invalid())?;
        NetworkRange::new(net.addr(), net.prefix_len()).map_err(|_| invalid())
    }
}

impl TryFrom<String> for NetworkRange {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NetworkRange> for String {
    fn from(range: NetworkRange) -> Self {
        range.to_string()
    }
}

impl fmt::Display for NetworkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix)
    }
}

/// Lazy sequence of sweep addresses: offsets `1..=count` added to the base,
/// wrapping modulo 2^32.
#[derive(Debug, Clone)]
pub struct AddressRange {
    base: u32,
    offset: u64,
    count: u64,
}

impl Iterator for AddressRange {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.count {
            return None;
        }
        self.offset += 1;
        // offset <= 2^31 - 1 for any valid prefix, the truncation is lossless
        Some(Ipv4Addr::from(self.base.wrapping_add(self.offset as u32)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = usize::try_from(self.count - self.offset).unwrap_or(usize::MAX);
        (left, Some(left))
    }
}

impl ExactSizeIterator for AddressRange {}

/// Parse `cidr` and return the addresses a sweep of it visits.
pub fn expand_addresses(cidr: &str) -> Result<AddressRange, ConfigError> {
    Ok(cidr.parse::<NetworkRange>()?.iter())
}

/// Detect local non-loopback IPv4 addresses and convert each to a default /24 range.
///
/// For example, an interface IP `192.168.1.42` becomes `192.168.1.0/24`.
/// Duplicates are removed.
pub fn detect_local_ranges() -> Result<Vec<NetworkRange>> {
    let mut set = HashSet::<NetworkRange>::new();
    for iface in get_if_addrs()? {
        if let IfAddr::V4(v4) = iface.addr {
            let ip = v4.ip;
            if ip.is_loopback() {
                continue;
            }
            set.insert(ipv4_to_default_range(ip));
        }
    }
    let mut ranges: Vec<NetworkRange> = set.into_iter().collect();
    // Sort for stable output
    ranges.sort_by_key(|r| (u32::from(r.base()), r.prefix_len()));
    Ok(ranges)
}

/// Helper: convert an IPv4 address into its default /24 range.
pub fn ipv4_to_default_range(ip: Ipv4Addr) -> NetworkRange {
    let o = ip.octets();
    NetworkRange {
        base: Ipv4Addr::new(o[0], o[1], o[2], 0),
        prefix: 24,
    }
}
