use std::ops::RangeInclusive;

use crate::error::ConfigError;

pub const LOWEST_PORT: u16 = 1;
pub const HIGHEST_PORT: u16 = 65535;

/// Inclusive, validated port interval for a port sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    low: u16,
    high: u16,
}

impl PortRange {
    /// Build a range, enforcing `1 <= low <= high <= 65535`.
    pub fn new(low: u16, high: u16) -> Result<Self, ConfigError> {
        if low < LOWEST_PORT || low > high {
            return Err(ConfigError::InvalidPortRange {
                low: u32::from(low),
                high: u32::from(high),
            });
        }
        Ok(Self { low, high })
    }

    pub fn low(&self) -> u16 {
        self.low
    }

    pub fn high(&self) -> u16 {
        self.high
    }

    pub fn len(&self) -> u64 {
        u64::from(self.high - self.low) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Ports in ascending order; restartable.
    pub fn iter(&self) -> RangeInclusive<u16> {
        self.low..=self.high
    }
}

/// Ports `low..=high` in order. An inverted pair yields nothing.
pub fn expand_ports(low: u16, high: u16) -> RangeInclusive<u16> {
    low..=high
}

/// Parse one textual port value, rejecting anything outside 1..=65535.
pub fn parse_port_str(s: &str) -> Result<u16, ConfigError> {
    let out_of_range = |v: u32| ConfigError::InvalidPortRange { low: v, high: v };
    let val: u32 = s.trim().parse().map_err(|_| out_of_range(0))?;
    if val < u32::from(LOWEST_PORT) || val > u32::from(HIGHEST_PORT) {
        return Err(out_of_range(val));
    }
    Ok(val as u16)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_inclusive_in_order() {
        let ports: Vec<u16> = expand_ports(20, 25).collect();
        assert_eq!(ports, vec![20, 21, 22, 23, 24, 25]);
    }

    #[test]
    fn full_range_len() {
        let r = PortRange::new(1, 65535).unwrap();
        assert_eq!(r.len(), 65535);
        assert_eq!(r.iter().last(), Some(65535));
    }

    #[test]
    fn rejects_zero_and_inverted() {
        assert!(PortRange::new(0, 10).is_err());
        assert!(PortRange::new(10, 9).is_err());
        assert!(PortRange::new(7, 7).is_ok());
    }

    #[test]
    fn parse_port_bounds() {
        assert_eq!(parse_port_str(" 443 ").unwrap(), 443);
        assert!(parse_port_str("0").is_err());
        assert!(parse_port_str("70000").is_err());
        assert!(parse_port_str("abc").is_err());
    }
}
