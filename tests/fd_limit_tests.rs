//! Runs in its own process: it lowers the descriptor limit for everything here.
#![cfg(unix)]

use std::sync::Arc;

use netsweep_rs::config::EngineOptions;
use netsweep_rs::probe::{fd_limit, TcpProber};
use netsweep_rs::protocols::ProtocolResolver;
use netsweep_rs::reporter::NoopReporter;
use netsweep_rs::scanner::Scanner;
use netsweep_rs::types::{ScanConfig, Verdict};
use rlimit::Resource;

#[tokio::test]
async fn loopback_sweep_under_low_descriptor_limit_finds_every_host() {
    let (_, hard) = Resource::NOFILE.get().unwrap();
    Resource::NOFILE.set(128.min(hard), hard).unwrap();
    assert!(fd_limit() <= 128);

    // every 127.0.0.0/8 address answers, by accepting or refusing
    let config = ScanConfig::address_sweep("127.0.0.0/22", 1000).unwrap();
    let scanner = Scanner::new(
        config,
        EngineOptions::default(),
        Arc::new(ProtocolResolver::default()),
    )
    .unwrap();

    let out = scanner.start(Arc::new(NoopReporter)).await.unwrap();
    let up = out
        .verdicts
        .iter()
        .filter(|v| matches!(v, Verdict::HostUp { .. }))
        .count();
    assert_eq!(out.total, 1023);
    assert_eq!(out.scanned, 1023);
    assert_eq!(up, 1023);

    let prober = TcpProber::new();
    assert!(prober.available_sockets() < 128);
}
