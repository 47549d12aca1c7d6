use async_trait::async_trait;
use log::{debug, trace, warn};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};

use crate::config::ProbeMethod;

/// Ports knocked on to decide whether a host is up.
pub const DEFAULT_ECHO_PORTS: &[u16] = &[80, 443, 22, 445, 139, 135, 53, 3389];

/// Descriptors left for the runtime, log output and the HTTP listener.
const FD_RESERVE: u64 = 64;
const MIN_SOCKETS: usize = 8;
const MAX_SOCKETS: usize = 16_384;

/// Soft limit on open file descriptors for this process.
#[cfg(unix)]
pub fn fd_limit() -> u64 {
    match rlimit::Resource::NOFILE.get() {
        Ok((soft, _hard)) => soft,
        Err(e) => {
            warn!("could not read file descriptor limit: {e}; assuming 1024");
            1024
        }
    }
}

#[cfg(not(unix))]
pub fn fd_limit() -> u64 {
    8192
}

/// Sockets a prober may hold open at once: 80% of the descriptors above the
/// reserve, within `MIN_SOCKETS..=MAX_SOCKETS`.
pub fn socket_budget(fd_limit: u64) -> usize {
    let usable = fd_limit.saturating_sub(FD_RESERVE).saturating_mul(4) / 5;
    usize::try_from(usable)
        .unwrap_or(MAX_SOCKETS)
        .clamp(MIN_SOCKETS, MAX_SOCKETS)
}

/// One bounded reachability check. Failures of any kind are negative verdicts,
/// never errors.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe_host(&self, address: IpAddr, timeout: Duration) -> bool;

    async fn probe_port(&self, address: IpAddr, port: u16, timeout: Duration) -> bool;

    /// Time one host probe. The elapsed time never exceeds `timeout`.
    async fn probe_latency(&self, address: IpAddr, timeout: Duration) -> (bool, Duration) {
        let start = Instant::now();
        let reachable = self.probe_host(address, timeout).await;
        (reachable, start.elapsed().min(timeout))
    }
}

/// Reachability via TCP connects.
///
/// A host counts as up when any echo port accepts or actively refuses the
/// connection: both need a live TCP stack on the other end.
///
/// Every connect holds a permit from a shared socket budget, so a wide pool
/// never runs the process out of file descriptors.
#[derive(Debug, Clone)]
pub struct TcpProber {
    echo_ports: Arc<[u16]>,
    sockets: Arc<Semaphore>,
}

impl TcpProber {
    pub fn new() -> Self {
        Self::with_echo_ports(DEFAULT_ECHO_PORTS)
    }

    pub fn with_echo_ports(ports: &[u16]) -> Self {
        let budget = socket_budget(fd_limit());
        debug!("tcp prober socket budget: {budget}");
        Self {
            echo_ports: Arc::from(ports),
            sockets: Arc::new(Semaphore::new(budget)),
        }
    }

    /// Replace the socket budget derived from the descriptor limit.
    pub fn with_socket_budget(mut self, sockets: usize) -> Self {
        self.sockets = Arc::new(Semaphore::new(sockets.clamp(1, MAX_SOCKETS)));
        self
    }

    /// Sockets that could be opened right now.
    pub fn available_sockets(&self) -> usize {
        self.sockets.available_permits()
    }

    /// Connect under the socket budget. `None` when the attempt timed out.
    async fn connect(&self, addr: SocketAddr, timeout: Duration) -> Option<io::Result<()>> {
        // the budget semaphore is never closed
        let _permit = self.sockets.acquire().await.ok()?;
        match time::timeout(timeout, TcpStream::connect(addr)).await {
            // stream is dropped, and the connection closed, right here
            Ok(Ok(_stream)) => Some(Ok(())),
            Ok(Err(e)) => Some(Err(e)),
            Err(_) => None,
        }
    }
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for TcpProber {
    async fn probe_host(&self, address: IpAddr, timeout: Duration) -> bool {
        let mut set = JoinSet::new();
        for &port in self.echo_ports.iter() {
            let prober = self.clone();
            set.spawn(async move { prober.knock(SocketAddr::new(address, port), timeout).await });
        }
        while let Some(res) = set.join_next().await {
            if let Ok(true) = res {
                set.abort_all();
                trace!("host {address} answered");
                return true;
            }
        }
        false
    }

    async fn probe_port(&self, address: IpAddr, port: u16, timeout: Duration) -> bool {
        let addr = SocketAddr::new(address, port);
        match self.connect(addr, timeout).await {
            Some(Ok(())) => true,
            Some(Err(e)) => {
                log_connect_error(addr, &e);
                false
            }
            None => false,
        }
    }
}

impl TcpProber {
    async fn knock(&self, addr: SocketAddr, timeout: Duration) -> bool {
        match self.connect(addr, timeout).await {
            Some(Ok(())) => true,
            Some(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => true,
            Some(Err(e)) => {
                log_connect_error(addr, &e);
                false
            }
            None => false,
        }
    }
}

/// Refusals, resets and unreachable routes are ordinary negative answers.
/// Anything else (descriptor exhaustion, permission errors) means the verdict
/// is not trustworthy.
fn log_connect_error(addr: SocketAddr, e: &io::Error) {
    use io::ErrorKind::*;
    match e.kind() {
        ConnectionRefused | ConnectionReset | ConnectionAborted | TimedOut | HostUnreachable
        | NetworkUnreachable => trace!("{addr} closed: {e}"),
        _ => warn!("{addr} connect failed: {e}"),
    }
}

/// ICMP echo through the system `ping` binary, so no raw socket privileges are
/// needed. Port probes still use TCP connects.
#[derive(Debug, Clone, Default)]
pub struct SystemPingProber {
    tcp: TcpProber,
}

impl SystemPingProber {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Prober for SystemPingProber {
    async fn probe_host(&self, address: IpAddr, timeout: Duration) -> bool {
        // a child process costs descriptors too
        let Ok(_permit) = self.tcp.sockets.acquire().await else {
            return false;
        };
        let mut cmd = Command::new("ping");
        cmd.args(ping_args(address, timeout))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        match time::timeout(timeout, cmd.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                warn!("ping {address} could not run: {e}");
                false
            }
            Err(_) => false,
        }
    }

    async fn probe_port(&self, address: IpAddr, port: u16, timeout: Duration) -> bool {
        self.tcp.probe_port(address, port, timeout).await
    }
}

#[cfg(windows)]
fn ping_args(address: IpAddr, timeout: Duration) -> Vec<String> {
    vec![
        "-n".into(),
        "1".into(),
        "-w".into(),
        timeout.as_millis().to_string(),
        address.to_string(),
    ]
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
fn ping_args(address: IpAddr, timeout: Duration) -> Vec<String> {
    // BSD -W waits for the reply in milliseconds
    vec![
        "-c".into(),
        "1".into(),
        "-W".into(),
        timeout.as_millis().max(1).to_string(),
        address.to_string(),
    ]
}

#[cfg(not(any(
    windows,
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
)))]
fn ping_args(address: IpAddr, timeout: Duration) -> Vec<String> {
    // -W takes whole seconds on Linux
    let secs = timeout.as_millis().div_ceil(1000).max(1);
    vec![
        "-c".into(),
        "1".into(),
        "-W".into(),
        secs.to_string(),
        address.to_string(),
    ]
}

pub fn prober_for(method: ProbeMethod) -> Arc<dyn Prober> {
    match method {
        ProbeMethod::Tcp => Arc::new(TcpProber::new()),
        ProbeMethod::Icmp => Arc::new(SystemPingProber::new()),
    }
}
