use std::fs;
use std::net::Ipv4Addr;

use netsweep_rs::error::ReportError;
use netsweep_rs::export::{export_report, import_report, ScanReport};
use netsweep_rs::protocols::ProtocolResolver;
use netsweep_rs::types::{PingSample, ScanConfig, Verdict};

fn ping_report() -> ScanReport {
    let config = ScanConfig::ping("192.168.0.10", 100, 3, false).unwrap();
    let samples = [(50, true, 0.0), (100, false, 50.0), (30, true, 33.33)];
    let verdicts: Vec<_> = samples
        .iter()
        .map(|&(round_trip_ms, success, loss_percent)| {
            Verdict::PingSample(PingSample {
                round_trip_ms,
                success,
                loss_percent,
            })
        })
        .collect();
    ScanReport::new(&config, &verdicts)
}

#[test]
fn exported_ping_can_be_imported_and_resummarized() {
    let dir = tempfile::tempdir().unwrap();
    let path = export_report(dir.path(), "office_ping", &ping_report()).unwrap();
    assert_eq!(path, dir.path().join("office_ping.json"));

    let report = import_report(&path, &ProtocolResolver::embedded()).unwrap();
    assert_eq!(report, ping_report());
    assert_eq!(
        report.config().unwrap(),
        ScanConfig::ping("192.168.0.10", 100, 3, false).unwrap()
    );

    let summary = report.summary().unwrap();
    assert_eq!(summary.min_rtt_ms, Some(30));
    assert_eq!(summary.max_rtt_ms, Some(100));
    assert_eq!(summary.average_rtt_ms, Some(40.0));
    assert_eq!(summary.loss_percent, 33.33);
}

#[test]
fn address_sweep_round_trip() {
    let config = ScanConfig::address_sweep("10.0.0.0/24", 500).unwrap();
    let verdicts = vec![Verdict::HostUp {
        address: Ipv4Addr::new(10, 0, 0, 7),
    }];
    let dir = tempfile::tempdir().unwrap();
    let path = export_report(dir.path(), "lan", &ScanReport::new(&config, &verdicts)).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["networkRange"], "10.0.0.0/24");
    assert_eq!(raw["subnetScanResults"][0]["ipAddress"], "10.0.0.7");

    let report = import_report(&path, &ProtocolResolver::default()).unwrap();
    assert_eq!(report.verdicts(), verdicts);
    assert!(report.summary().is_none());
}

#[test]
fn bad_file_name_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let err = export_report(dir.path(), "../escape", &ping_report()).unwrap_err();
    assert!(matches!(err, ReportError::FileName(_)));
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn import_rejects_out_of_range_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(
        &path,
        r#"{"networkRange":"10.0.0.0/24","timeout":50,"subnetScanResults":[]}"#,
    )
    .unwrap();
    let err = import_report(&path, &ProtocolResolver::default()).unwrap_err();
    assert!(matches!(err, ReportError::Config(_)));
}

#[test]
fn import_rejects_bad_host_and_unknown_shape() {
    let dir = tempfile::tempdir().unwrap();
    let bad_host = dir.path().join("host.json");
    fs::write(
        &bad_host,
        r#"{"networkRange":"10.0.0.0/24","timeout":500,"subnetScanResults":[{"ipAddress":"10.0.0.300"}]}"#,
    )
    .unwrap();
    assert!(matches!(
        import_report(&bad_host, &ProtocolResolver::default()),
        Err(ReportError::Record { field: "ipAddress", index: 0, .. })
    ));

    let unknown = dir.path().join("unknown.json");
    fs::write(&unknown, r#"{"hello":"world"}"#).unwrap();
    assert!(matches!(
        import_report(&unknown, &ProtocolResolver::default()),
        Err(ReportError::Json(_))
    ));
}

#[test]
fn import_rejects_round_trip_beyond_interval() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ping.json");
    fs::write(
        &path,
        r#"{"ipAddress":"10.0.0.1","pingInterval":100,"numOfPings":1,"continuousPinging":false,
            "devicePingResults":[{"roundTripTime":150,"successfulPing":true,"packetLoss":0.0}]}"#,
    )
    .unwrap();
    assert!(matches!(
        import_report(&path, &ProtocolResolver::default()),
        Err(ReportError::Record { field: "roundTripTime", .. })
    ));
}
