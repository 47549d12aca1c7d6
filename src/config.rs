use serde::{Deserialize, Serialize};
use std::fs;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use crate::error::ConfigError;
use crate::netdetect::NetworkRange;
use crate::ports::PortRange;
use crate::types::ScanConfig;

pub const MIN_TIMEOUT_MS: u64 = 100;
pub const MAX_TIMEOUT_MS: u64 = 10_000;
pub const MIN_INTERVAL_MS: u64 = 100;
pub const MAX_INTERVAL_MS: u64 = 10_000;
pub const MIN_PINGS: u32 = 1;
pub const MAX_PINGS: u32 = 100;

/// Workers per available core. Probes block on socket I/O, not CPU.
pub const DEFAULT_POOL_MULTIPLIER: usize = 32;
pub const MAX_POOL_MULTIPLIER: usize = 1024;
/// Upper bound on concurrent sweep units regardless of core count.
pub const MAX_POOL_SIZE: usize = 65_536;
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 600;

impl ScanConfig {
    pub fn address_sweep(range: &str, timeout_ms: u64) -> Result<Self, ConfigError> {
        let config = ScanConfig::AddressSweep {
            range: range.parse()?,
            timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn port_sweep(address: &str, low: u16, high: u16, timeout_ms: u64) -> Result<Self, ConfigError> {
        let config = ScanConfig::PortSweep {
            address: parse_ipv4(address)?,
            low,
            high,
            timeout_ms,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn ping(address: &str, interval_ms: u64, count: u32, continuous: bool) -> Result<Self, ConfigError> {
        let config = ScanConfig::Ping {
            address: parse_ipv4(address)?,
            interval_ms,
            count,
            continuous,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            ScanConfig::AddressSweep { range, timeout_ms } => {
                NetworkRange::new(range.base(), range.prefix_len())?;
                validate_timeout(*timeout_ms)
            }
            ScanConfig::PortSweep {
                low,
                high,
                timeout_ms,
                ..
            } => {
                PortRange::new(*low, *high)?;
                validate_timeout(*timeout_ms)
            }
            ScanConfig::Ping {
                interval_ms,
                count,
                continuous,
                ..
            } => {
                validate_interval(*interval_ms)?;
                if !continuous {
                    validate_count(*count)?;
                }
                Ok(())
            }
        }
    }
}

/// Strict dotted-quad IPv4 (no leading zeros, no hostnames).
pub fn parse_ipv4(s: &str) -> Result<Ipv4Addr, ConfigError> {
    Ipv4Addr::from_str(s.trim()).map_err(|_| ConfigError::InvalidAddress(s.to_string()))
}

pub fn validate_timeout(ms: u64) -> Result<(), ConfigError> {
    if !(MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS).contains(&ms) {
        return Err(ConfigError::TimeoutOutOfRange(ms));
    }
    Ok(())
}

pub fn validate_interval(ms: u64) -> Result<(), ConfigError> {
    if !(MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&ms) {
        return Err(ConfigError::IntervalOutOfRange(ms));
    }
    Ok(())
}

pub fn validate_count(count: u32) -> Result<(), ConfigError> {
    if !(MIN_PINGS..=MAX_PINGS).contains(&count) {
        return Err(ConfigError::CountOutOfRange(count));
    }
    Ok(())
}

/// What a stop request does to a sweep in progress.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    /// Already-submitted units run to completion; the session cannot be restarted.
    #[default]
    Advisory,
    /// The flag is checked before each submission and before each unit runs.
    Cooperative,
}

/// How host reachability is checked.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProbeMethod {
    #[default]
    Tcp,
    Icmp,
}

/// Engine tunables, optionally read from a TOML file.
///
/// # Format
///
/// pool_multiplier = 32
/// grace_period_secs = 600
/// stop_policy = "advisory"
/// probe_method = "tcp"
/// protocol_table = "/etc/netsweep/port_list.csv"
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct EngineOptions {
    pub pool_multiplier: usize,
    pub grace_period_secs: u64,
    pub stop_policy: StopPolicy,
    pub probe_method: ProbeMethod,
    pub protocol_table: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            pool_multiplier: DEFAULT_POOL_MULTIPLIER,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            stop_policy: StopPolicy::default(),
            probe_method: ProbeMethod::default(),
            protocol_table: None,
        }
    }
}

impl EngineOptions {
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let err = |reason: String| ConfigError::Options {
            path: path.display().to_string(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
        let options = Self::from_toml(&content).map_err(|e| err(e.to_string()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_POOL_MULTIPLIER).contains(&self.pool_multiplier) {
            return Err(ConfigError::PoolMultiplierOutOfRange(self.pool_multiplier));
        }
        Ok(())
    }

    /// `max(1, available_parallelism) * pool_multiplier`, within `1..=MAX_POOL_SIZE`.
    pub fn pool_size(&self) -> usize {
        let cores = thread::available_parallelism().map_or(1, |n| n.get());
        cores
            .max(1)
            .saturating_mul(self.pool_multiplier.max(1))
            .min(MAX_POOL_SIZE)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_validate() {
        assert!(ScanConfig::address_sweep("192.168.0.0/24", 500).is_ok());
        assert_eq!(
            ScanConfig::address_sweep("192.168.0.0/24", 50),
            Err(ConfigError::TimeoutOutOfRange(50))
        );
        assert!(matches!(
            ScanConfig::address_sweep("192.168.0.0/0", 500),
            Err(ConfigError::InvalidNetworkRange(_))
        ));
        assert!(ScanConfig::port_sweep("10.0.0.1", 1, 65535, 100).is_ok());
        assert!(ScanConfig::port_sweep("10.0.0.1", 0, 10, 100).is_err());
        assert!(ScanConfig::port_sweep("10.0.0.1", 80, 79, 100).is_err());
        assert!(ScanConfig::port_sweep("example.com", 1, 2, 100).is_err());
        assert!(ScanConfig::port_sweep("010.0.0.1", 1, 2, 100).is_err());
    }

    #[test]
    fn ping_count_ignored_when_continuous() {
        assert!(ScanConfig::ping("10.0.0.1", 1000, 0, true).is_ok());
        assert_eq!(
            ScanConfig::ping("10.0.0.1", 1000, 0, false),
            Err(ConfigError::CountOutOfRange(0))
        );
        assert_eq!(
            ScanConfig::ping("10.0.0.1", 99, 4, false),
            Err(ConfigError::IntervalOutOfRange(99))
        );
        assert!(ScanConfig::ping("10.0.0.1", 10_000, 100, false).is_ok());
    }

    #[test]
    fn engine_options_defaults_fill_missing_keys() {
        let opts = EngineOptions::from_toml("pool_multiplier = 4\nstop_policy = \"cooperative\"\n").unwrap();
        assert_eq!(opts.pool_multiplier, 4);
        assert_eq!(opts.stop_policy, StopPolicy::Cooperative);
        assert_eq!(opts.grace_period_secs, DEFAULT_GRACE_PERIOD_SECS);
        assert_eq!(opts.probe_method, ProbeMethod::Tcp);
        assert!(opts.pool_size() >= 4);
    }

    #[test]
    fn zero_multiplier_still_gives_a_worker() {
        let opts = EngineOptions {
            pool_multiplier: 0,
            ..EngineOptions::default()
        };
        assert!(opts.pool_size() >= 1);
    }

    #[test]
    fn huge_multiplier_is_rejected_and_clamped() {
        let opts = EngineOptions::from_toml("pool_multiplier = 4611686018427387904").unwrap();
        assert_eq!(
            opts.validate(),
            Err(ConfigError::PoolMultiplierOutOfRange(4_611_686_018_427_387_904))
        );
        assert_eq!(opts.pool_size(), MAX_POOL_SIZE);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        fs::write(&path, "pool_multiplier = 4611686018427387904\n").unwrap();
        assert!(matches!(
            EngineOptions::read(&path),
            Err(ConfigError::PoolMultiplierOutOfRange(_))
        ));
    }
}
