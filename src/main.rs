use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use netsweep_rs::config::EngineOptions;
use netsweep_rs::export::{self, ScanReport};
use netsweep_rs::netdetect;
use netsweep_rs::protocols::ProtocolResolver;
use netsweep_rs::reporter::{ConsoleReporter, ProgressReporter};
use netsweep_rs::scanner::Scanner;
use netsweep_rs::server::{self, AppState};
use netsweep_rs::types::ScanConfig;

/// netsweep: concurrent address sweeps, port sweeps and timed pings.
#[derive(Debug, Parser)]
#[command(name = "netsweep", version, about, long_about = None)]
struct Cli {
    /// Engine options file (TOML). Defaults apply for missing keys.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Find reachable hosts in a network range.
    Sweep {
        /// CIDR, e.g. 192.168.1.0/24. If omitted, auto-detect the local /24.
        #[arg(long)]
        range: Option<String>,

        /// Per-probe timeout in milliseconds.
        #[arg(long = "timeout-ms", default_value_t = 1000)]
        timeout_ms: u64,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Find open TCP ports on one host.
    Ports {
        address: String,

        #[arg(long, default_value_t = 1)]
        low: u16,

        #[arg(long, default_value_t = 1024)]
        high: u16,

        #[arg(long = "timeout-ms", default_value_t = 500)]
        timeout_ms: u64,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Probe one host once per interval.
    Ping {
        address: String,

        #[arg(long = "interval-ms", default_value_t = 1000)]
        interval_ms: u64,

        #[arg(long, default_value_t = 4)]
        count: u32,

        /// Keep pinging until Ctrl+C.
        #[arg(long, default_value_t = false)]
        continuous: bool,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Validate and print a previously exported report.
    Import { path: PathBuf },
    /// Serve the JSON API.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: Ipv4Addr,

        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Debug, Args)]
struct OutputArgs {
    /// Directory to write the JSON report into.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Report file name, without extension.
    #[arg(long, requires = "output")]
    name: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let options = match cli.config.as_deref() {
        Some(path) => EngineOptions::read(path)?,
        None => EngineOptions::default(),
    };
    let resolver = Arc::new(ProtocolResolver::load(options.protocol_table.as_deref()));

    match cli.command {
        Command::Sweep {
            range,
            timeout_ms,
            output,
        } => {
            let range = match range {
                Some(r) => r,
                None => detect_range()?,
            };
            let config = ScanConfig::address_sweep(&range, timeout_ms)?;
            run(config, options, resolver, output).await
        }
        Command::Ports {
            address,
            low,
            high,
            timeout_ms,
            output,
        } => {
            let config = ScanConfig::port_sweep(&address, low, high, timeout_ms)?;
            run(config, options, resolver, output).await
        }
        Command::Ping {
            address,
            interval_ms,
            count,
            continuous,
            output,
        } => {
            let config = ScanConfig::ping(&address, interval_ms, count, continuous)?;
            run(config, options, resolver, output).await
        }
        Command::Import { path } => import(&path, &resolver),
        Command::Serve { bind, port } => {
            let state = AppState::new(options, resolver);
            tokio::select! {
                res = server::spawn_server((bind, port), state) => res,
                _ = tokio::signal::ctrl_c() => Ok(()),
            }
        }
    }
}

fn detect_range() -> Result<String> {
    let ranges = netdetect::detect_local_ranges().context("failed to detect local networks")?;
    let Some(first) = ranges.first() else {
        bail!("no local IPv4 network found; pass --range");
    };
    if ranges.len() > 1 {
        info!("several local networks found, sweeping {first}");
    }
    Ok(first.to_string())
}

async fn run(
    config: ScanConfig,
    options: EngineOptions,
    resolver: Arc<ProtocolResolver>,
    output: OutputArgs,
) -> Result<()> {
    print_config(&config);
    let scanner = Arc::new(Scanner::new(config, options, resolver)?);

    // first Ctrl+C asks politely, the second cancels outstanding probes
    let watcher = Arc::clone(&scanner);
    let signals = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("stop requested; press Ctrl+C again to abort");
            watcher.request_stop();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("aborting");
            watcher.shutdown();
        }
    });

    let reporter: Arc<dyn ProgressReporter> = Arc::new(ConsoleReporter::new());
    let outcome = scanner.start(reporter).await;
    signals.abort();
    let outcome = outcome?;

    if outcome.grace_expired {
        warn!(
            "{} of {} probes finished before the grace period ran out",
            outcome.scanned, outcome.total
        );
    }

    if let Some(dir) = output.output.as_deref() {
        let name = output.name.unwrap_or_else(|| default_name(&outcome.config));
        let report = ScanReport::from_outcome(&outcome);
        let path = export::export_report(dir, &name, &report)
            .with_context(|| format!("failed to write report to {}", dir.display()))?;
        println!("Wrote JSON report to {}", path.display());
    }
    Ok(())
}

fn import(path: &Path, resolver: &ProtocolResolver) -> Result<()> {
    let report = export::import_report(path, resolver)
        .with_context(|| format!("invalid report {}", path.display()))?;
    let config = report.config()?;
    print_config(&config);

    let reporter = ConsoleReporter::new();
    let verdicts = report.verdicts();
    for v in &verdicts {
        reporter.on_result(v);
    }
    reporter.on_complete(report.summary().as_ref());
    if verdicts.is_empty() {
        println!("  (no results recorded)");
    }
    Ok(())
}

fn print_config(config: &ScanConfig) {
    println!("netsweep configuration:");
    match config {
        ScanConfig::AddressSweep { range, timeout_ms } => {
            println!("  range        : {range} ({} hosts)", range.host_count());
            println!("  timeout_ms   : {timeout_ms}");
        }
        ScanConfig::PortSweep {
            address,
            low,
            high,
            timeout_ms,
        } => {
            println!("  address      : {address}");
            println!("  ports        : {low}-{high}");
            println!("  timeout_ms   : {timeout_ms}");
        }
        ScanConfig::Ping {
            address,
            interval_ms,
            count,
            continuous,
        } => {
            println!("  address      : {address}");
            println!("  interval_ms  : {interval_ms}");
            if *continuous {
                println!("  count        : <continuous>");
            } else {
                println!("  count        : {count}");
            }
        }
    }
}

fn default_name(config: &ScanConfig) -> String {
    let kind = match config {
        ScanConfig::AddressSweep { .. } => "sweep",
        ScanConfig::PortSweep { .. } => "ports",
        ScanConfig::Ping { .. } => "ping",
    };
    let stamp = time::OffsetDateTime::now_utc().unix_timestamp();
    format!("{kind}_{stamp}")
}

