//! Flat JSON record of a scan: its configuration plus its results.
//!
//! The results-array key tells the scan kinds apart on import
//! (`subnetScanResults`, `portScanResults`, `devicePingResults`).
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::config::{parse_ipv4, validate_count, MAX_PINGS, MIN_PINGS};
use crate::error::{ConfigError, ReportError};
use crate::protocols::ProtocolResolver;
use crate::stats::{self, PingSummary};
use crate::types::{PingSample, ScanConfig, ScanOutcome, Verdict};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ScanReport {
    AddressSweep(AddressSweepReport),
    PortSweep(PortSweepReport),
    Ping(PingReport),
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AddressSweepReport {
    pub network_range: String,
    pub timeout: u64,
    pub subnet_scan_results: Vec<HostRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostRecord {
    pub ip_address: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortSweepReport {
    pub ip_address: String,
    pub bottom_range_port: u32,
    pub top_range_port: u32,
    pub timeout: u64,
    pub port_scan_results: Vec<PortRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortRecord {
    pub port_number: u32,
    pub protocol: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PingReport {
    pub ip_address: String,
    pub ping_interval: u64,
    pub num_of_pings: u32,
    pub continuous_pinging: bool,
    pub device_ping_results: Vec<PingRecord>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PingRecord {
    pub round_trip_time: u64,
    pub successful_ping: bool,
    pub packet_loss: f64,
}

impl ScanReport {
    pub fn new(config: &ScanConfig, verdicts: &[Verdict]) -> Self {
        match config {
            ScanConfig::AddressSweep { range, timeout_ms } => ScanReport::AddressSweep(AddressSweepReport {
                network_range: range.to_string(),
                timeout: *timeout_ms,
                subnet_scan_results: verdicts
                    .iter()
                    .filter_map(|v| match v {
                        Verdict::HostUp { address } => Some(HostRecord {
                            ip_address: address.to_string(),
                        }),
                        _ => None,
                    })
                    .collect(),
            }),
            ScanConfig::PortSweep {
                address,
                low,
                high,
                timeout_ms,
            } => ScanReport::PortSweep(PortSweepReport {
                ip_address: address.to_string(),
                bottom_range_port: u32::from(*low),
                top_range_port: u32::from(*high),
                timeout: *timeout_ms,
                port_scan_results: verdicts
                    .iter()
                    .filter_map(|v| match v {
                        Verdict::PortOpen { port, protocol } => Some(PortRecord {
                            port_number: u32::from(*port),
                            protocol: protocol.clone(),
                        }),
                        _ => None,
                    })
                    .collect(),
            }),
            ScanConfig::Ping {
                address,
                interval_ms,
                count,
                continuous,
            } => ScanReport::Ping(PingReport {
                ip_address: address.to_string(),
                ping_interval: *interval_ms,
                // the record always carries an in-range count, continuous or not
                num_of_pings: if *continuous {
                    (*count).clamp(MIN_PINGS, MAX_PINGS)
                } else {
                    *count
                },
                continuous_pinging: *continuous,
                device_ping_results: verdicts
                    .iter()
                    .filter_map(Verdict::as_ping_sample)
                    .map(|s| PingRecord {
                        round_trip_time: s.round_trip_ms,
                        successful_ping: s.success,
                        packet_loss: s.loss_percent,
                    })
                    .collect(),
            }),
        }
    }

    pub fn from_outcome(outcome: &ScanOutcome) -> Self {
        Self::new(&outcome.config, &outcome.verdicts)
    }

    /// The configuration this report was produced with, validated.
    pub fn config(&self) -> Result<ScanConfig, ConfigError> {
        match self {
            ScanReport::AddressSweep(r) => ScanConfig::address_sweep(&r.network_range, r.timeout),
            ScanReport::PortSweep(r) => {
                let low = port_u16(r.bottom_range_port, r.top_range_port)?;
                let high = port_u16(r.top_range_port, r.bottom_range_port)?;
                ScanConfig::port_sweep(&r.ip_address, low, high, r.timeout)
            }
            ScanReport::Ping(r) => {
                ScanConfig::ping(&r.ip_address, r.ping_interval, r.num_of_pings, r.continuous_pinging)
            }
        }
    }

    /// Check the configuration and every result record.
    pub fn validate(&self, resolver: &ProtocolResolver) -> Result<(), ReportError> {
        self.config()?;
        match self {
            ScanReport::AddressSweep(r) => {
                for (index, host) in r.subnet_scan_results.iter().enumerate() {
                    parse_ipv4(&host.ip_address).map_err(|e| record("ipAddress", index, e))?;
                }
            }
            ScanReport::PortSweep(r) => {
                for (index, rec) in r.port_scan_results.iter().enumerate() {
                    let port = u16::try_from(rec.port_number)
                        .ok()
                        .filter(|p| *p >= 1)
                        .ok_or_else(|| record("portNumber", index, "outside 1-65535"))?;
                    let expected = resolver.lookup(port);
                    if rec.protocol != expected {
                        return Err(record(
                            "protocol",
                            index,
                            format!("port {port} is '{expected}', not '{}'", rec.protocol),
                        ));
                    }
                }
            }
            ScanReport::Ping(r) => {
                // checked even for continuous runs
                validate_count(r.num_of_pings)?;
                let interval = r.ping_interval;
                for (index, rec) in r.device_ping_results.iter().enumerate() {
                    if rec.round_trip_time > interval {
                        return Err(record("roundTripTime", index, "exceeds the ping interval"));
                    }
                    if !rec.successful_ping && rec.round_trip_time < interval {
                        return Err(record(
                            "successfulPing",
                            index,
                            "a failed ping must cost exactly one interval",
                        ));
                    }
                    if !(0.0..=100.0).contains(&rec.packet_loss) {
                        return Err(record("packetLoss", index, "outside 0-100"));
                    }
                }
            }
        }
        Ok(())
    }

    /// Rebuild the verdicts. Call [`ScanReport::validate`] first.
    pub fn verdicts(&self) -> Vec<Verdict> {
        match self {
            ScanReport::AddressSweep(r) => r
                .subnet_scan_results
                .iter()
                .filter_map(|h| h.ip_address.parse::<Ipv4Addr>().ok())
                .map(|address| Verdict::HostUp { address })
                .collect(),
            ScanReport::PortSweep(r) => r
                .port_scan_results
                .iter()
                .filter_map(|p| {
                    Some(Verdict::PortOpen {
                        port: u16::try_from(p.port_number).ok()?,
                        protocol: p.protocol.clone(),
                    })
                })
                .collect(),
            ScanReport::Ping(r) => r
                .device_ping_results
                .iter()
                .map(|p| {
                    Verdict::PingSample(PingSample {
                        round_trip_ms: p.round_trip_time,
                        success: p.successful_ping,
                        loss_percent: p.packet_loss,
                    })
                })
                .collect(),
        }
    }

    /// Ping statistics recomputed from the stored samples.
    pub fn summary(&self) -> Option<PingSummary> {
        let ScanReport::Ping(_) = self else {
            return None;
        };
        let samples: Vec<PingSample> = self
            .verdicts()
            .iter()
            .filter_map(Verdict::as_ping_sample)
            .copied()
            .collect();
        Some(stats::summarize(&samples))
    }
}

/// Reject blank names and names that could escape the target directory or
/// carry their own extension.
pub fn validate_file_name(name: &str) -> Result<(), ReportError> {
    let bad = name.trim().is_empty() || name.contains(['.', '/', '\\']);
    if bad {
        return Err(ReportError::FileName(name.to_string()));
    }
    Ok(())
}

/// Write `report` as pretty JSON to `<dir>/<name>.json` and return the path.
pub fn export_report(dir: impl AsRef<Path>, name: &str, report: &ScanReport) -> Result<PathBuf, ReportError> {
    validate_file_name(name)?;
    let path = dir.as_ref().join(format!("{name}.json"));
    let file = File::create(&path)?;
    serde_json::to_writer_pretty(BufWriter::new(file), report)?;
    Ok(path)
}

/// Read and validate a report written by [`export_report`].
pub fn import_report(path: impl AsRef<Path>, resolver: &ProtocolResolver) -> Result<ScanReport, ReportError> {
    let content = fs::read_to_string(path.as_ref())?;
    let report: ScanReport = serde_json::from_str(&content)?;
    report.validate(resolver)?;
    Ok(report)
}

fn port_u16(value: u32, other: u32) -> Result<u16, ConfigError> {
    u16::try_from(value).map_err(|_| ConfigError::InvalidPortRange {
        low: value.min(other),
        high: value.max(other),
    })
}

fn record(field: &'static str, index: usize, reason: impl ToString) -> ReportError {
    ReportError::Record {
        field,
        index,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert!(validate_file_name("scan_1").is_ok());
        for bad in ["", "  ", "a.json", "../x", "a\\b"] {
            assert!(validate_file_name(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn ping_report_uses_flat_camel_case_keys() {
        let config = ScanConfig::ping("10.0.0.1", 100, 2, false).unwrap();
        let verdicts = vec![
            Verdict::PingSample(PingSample {
                round_trip_ms: 12,
                success: true,
                loss_percent: 0.0,
            }),
            Verdict::PingSample(PingSample {
                round_trip_ms: 100,
                success: false,
                loss_percent: 50.0,
            }),
        ];
        let json = serde_json::to_value(ScanReport::new(&config, &verdicts)).unwrap();
        assert_eq!(json["ipAddress"], "10.0.0.1");
        assert_eq!(json["pingInterval"], 100);
        assert_eq!(json["numOfPings"], 2);
        assert_eq!(json["continuousPinging"], false);
        assert_eq!(json["devicePingResults"][1]["roundTripTime"], 100);
        assert_eq!(json["devicePingResults"][1]["successfulPing"], false);
        assert_eq!(json["devicePingResults"][1]["packetLoss"], 50.0);
    }

    #[test]
    fn results_key_selects_scan_kind() {
        let json = r#"{"ipAddress":"10.0.0.2","bottomRangePort":20,"topRangePort":25,"timeout":500,
                       "portScanResults":[{"portNumber":22,"protocol":"SSH"}]}"#;
        let report: ScanReport = serde_json::from_str(json).unwrap();
        assert!(matches!(report, ScanReport::PortSweep(_)));
        report.validate(&ProtocolResolver::embedded()).unwrap();
        assert_eq!(
            report.verdicts(),
            vec![Verdict::PortOpen {
                port: 22,
                protocol: "SSH".into()
            }]
        );
    }

    #[test]
    fn protocol_must_match_table() {
        let report = ScanReport::PortSweep(PortSweepReport {
            ip_address: "10.0.0.2".into(),
            bottom_range_port: 1,
            top_range_port: 100,
            timeout: 500,
            port_scan_results: vec![PortRecord {
                port_number: 22,
                protocol: "HTTP".into(),
            }],
        });
        let err = report.validate(&ProtocolResolver::embedded()).unwrap_err();
        assert!(matches!(err, ReportError::Record { field: "protocol", index: 0, .. }));
    }

    #[test]
    fn failed_ping_must_cost_full_interval() {
        let report = ScanReport::Ping(PingReport {
            ip_address: "10.0.0.3".into(),
            ping_interval: 200,
            num_of_pings: 1,
            continuous_pinging: false,
            device_ping_results: vec![PingRecord {
                round_trip_time: 20,
                successful_ping: false,
                packet_loss: 100.0,
            }],
        });
        assert!(report.validate(&ProtocolResolver::default()).is_err());
    }

    #[test]
    fn continuous_report_still_needs_ping_count_in_range() {
        let report = ScanReport::Ping(PingReport {
            ip_address: "10.0.0.3".into(),
            ping_interval: 200,
            num_of_pings: 0,
            continuous_pinging: true,
            device_ping_results: vec![],
        });
        assert!(matches!(
            report.validate(&ProtocolResolver::default()),
            Err(ReportError::Config(ConfigError::CountOutOfRange(0)))
        ));
    }

    #[test]
    fn continuous_run_exports_an_importable_count() {
        let config = ScanConfig::ping("10.0.0.3", 200, 0, true).unwrap();
        let report = ScanReport::new(&config, &[]);
        let ScanReport::Ping(ref ping) = report else {
            panic!("expected a ping report");
        };
        assert_eq!(ping.num_of_pings, MIN_PINGS);
        report.validate(&ProtocolResolver::default()).unwrap();
    }
}
