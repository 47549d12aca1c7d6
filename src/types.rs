use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use crate::netdetect::NetworkRange;
use crate::stats::PingSummary;

/// Immutable description of one scan run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanConfig {
    /// Sweep a network range for reachable hosts.
    AddressSweep { range: NetworkRange, timeout_ms: u64 },
    /// Sweep an inclusive port range on one host for open TCP ports.
    PortSweep {
        address: Ipv4Addr,
        low: u16,
        high: u16,
        timeout_ms: u64,
    },
    /// Probe one host repeatedly, once per interval.
    Ping {
        address: Ipv4Addr,
        interval_ms: u64,
        count: u32,
        #[serde(default)]
        continuous: bool,
    },
}

impl ScanConfig {
    /// Number of probes the run will issue, `None` for a continuous ping.
    pub fn target_count(&self) -> Option<u64> {
        match self {
            ScanConfig::AddressSweep { range, .. } => Some(range.host_count()),
            ScanConfig::PortSweep { low, high, .. } => {
                Some(u64::from(*high).saturating_sub(u64::from(*low)) + 1)
            }
            ScanConfig::Ping {
                continuous: true, ..
            } => None,
            ScanConfig::Ping { count, .. } => Some(u64::from(*count)),
        }
    }

    pub fn is_sweep(&self) -> bool {
        !matches!(self, ScanConfig::Ping { .. })
    }
}

/// One unit of work handed to a prober.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanTarget {
    Address(Ipv4Addr),
    Port(Ipv4Addr, u16),
}

/// A single ping attempt. Failed attempts carry the full interval as round trip.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PingSample {
    pub round_trip_ms: u64,
    pub success: bool,
    /// Cumulative loss over all attempts up to and including this one.
    pub loss_percent: f64,
}

/// Outcome record produced by one probe.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Verdict {
    HostUp { address: Ipv4Addr },
    PortOpen { port: u16, protocol: String },
    PingSample(PingSample),
}

impl Verdict {
    pub fn as_ping_sample(&self) -> Option<&PingSample> {
        match self {
            Verdict::PingSample(sample) => Some(sample),
            _ => None,
        }
    }
}

/// Everything a finished run leaves behind.
#[derive(Serialize, Debug, Clone)]
pub struct ScanOutcome {
    pub config: ScanConfig,
    pub verdicts: Vec<Verdict>,
    pub summary: Option<PingSummary>,
    pub scanned: u64,
    pub total: u64,
    /// The grace period elapsed and outstanding sweep units were cancelled.
    pub grace_expired: bool,
    pub stop_requested: bool,
}
