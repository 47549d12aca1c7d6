use log::{debug, info, trace, warn};
use serde::Serialize;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::{EngineOptions, StopPolicy};
use crate::error::ScanError;
use crate::ports::expand_ports;
use crate::probe::{prober_for, Prober};
use crate::protocols::ProtocolResolver;
use crate::reporter::ProgressReporter;
use crate::results::{percent, ResultSet};
use crate::stats;
use crate::types::{PingSample, ScanConfig, ScanOutcome, ScanTarget, Verdict};

/// Run state of one scan session. A session is never restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Pending,
    Running,
    Stopping,
    Completed,
}

/// Coordinates one scan run end to end: target fan-out over a bounded worker
/// pool for sweeps, a paced sequential loop for pings.
///
/// - Concurrency is bounded by a `Semaphore` sized from [`EngineOptions::pool_size`].
/// - `request_stop` is advisory by default: units already submitted still run.
/// - `shutdown` cancels outstanding units at once; otherwise they are cancelled
///   when the grace period runs out.
pub struct Scanner {
    config: ScanConfig,
    options: EngineOptions,
    prober: Arc<dyn Prober>,
    resolver: Arc<ProtocolResolver>,
    results: ResultSet,
    state: Mutex<SessionState>,
    stop: CancellationToken,
    abort: CancellationToken,
}

impl Scanner {
    pub fn new(
        config: ScanConfig,
        options: EngineOptions,
        resolver: Arc<ProtocolResolver>,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        options.validate()?;
        Ok(Self {
            prober: prober_for(options.probe_method),
            config,
            options,
            resolver,
            results: ResultSet::new(),
            state: Mutex::new(SessionState::Pending),
            stop: CancellationToken::new(),
            abort: CancellationToken::new(),
        })
    }

    /// Replace the prober chosen from the engine options.
    pub fn with_prober(mut self, prober: Arc<dyn Prober>) -> Self {
        self.prober = prober;
        self
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        *self.lock_state()
    }

    /// Handle to the live result set.
    pub fn results(&self) -> ResultSet {
        self.results.clone()
    }

    /// Fraction of targets probed so far, `0.0..=1.0`. A continuous ping has no
    /// end, so it reads 0.0 until it completes.
    pub fn progress(&self) -> f64 {
        if self.config.target_count().is_none() && self.state() != SessionState::Completed {
            return 0.0;
        }
        self.results.fraction()
    }

    pub fn request_stop(&self) {
        self.stop.cancel();
        let mut state = self.lock_state();
        *state = match *state {
            SessionState::Pending => SessionState::Completed,
            SessionState::Running => SessionState::Stopping,
            other => other,
        };
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Stop and force-cancel outstanding work without waiting for the grace period.
    pub fn shutdown(&self) {
        self.abort.cancel();
        self.request_stop();
    }

    /// Run the scan to completion. Fails if this session was started or stopped before.
    pub async fn start(&self, reporter: Arc<dyn ProgressReporter>) -> Result<ScanOutcome, ScanError> {
        self.begin()?;
        let started = Instant::now();

        let grace_expired = match self.config.clone() {
            ScanConfig::AddressSweep { range, timeout_ms } => {
                let targets = range.iter().map(ScanTarget::Address);
                self.sweep(targets, range.host_count(), ms(timeout_ms), &reporter)
                    .await
            }
            ScanConfig::PortSweep {
                address,
                low,
                high,
                timeout_ms,
            } => {
                let targets = expand_ports(low, high).map(move |p| ScanTarget::Port(address, p));
                let total = self.config.target_count().unwrap_or_default();
                self.sweep(targets, total, ms(timeout_ms), &reporter).await
            }
            ScanConfig::Ping {
                address,
                interval_ms,
                count,
                continuous,
            } => {
                self.ping(address, interval_ms, count, continuous, &reporter)
                    .await;
                false
            }
        };

        let summary = (!self.config.is_sweep()).then(|| stats::summarize(&self.results.ping_samples()));
        reporter.on_complete(summary.as_ref());
        *self.lock_state() = SessionState::Completed;

        let verdicts = self.results.snapshot();
        info!(
            "scan finished in {:.2?}: {} of {} probed, {} recorded",
            started.elapsed(),
            self.results.scanned(),
            self.results.total(),
            verdicts.len()
        );

        Ok(ScanOutcome {
            config: self.config.clone(),
            verdicts,
            summary,
            scanned: self.results.scanned(),
            total: self.results.total(),
            grace_expired,
            stop_requested: self.is_stop_requested(),
        })
    }

    fn begin(&self) -> Result<(), ScanError> {
        let mut state = self.lock_state();
        if *state != SessionState::Pending || self.stop.is_cancelled() {
            return Err(ScanError::SessionConsumed);
        }
        *state = SessionState::Running;
        Ok(())
    }

    /// Fan targets out over the pool. Returns true when the grace period ran out.
    async fn sweep<I>(
        &self,
        targets: I,
        total: u64,
        timeout: Duration,
        reporter: &Arc<dyn ProgressReporter>,
    ) -> bool
    where
        I: Iterator<Item = ScanTarget>,
    {
        self.results.reset(total);
        reporter.on_progress(0);
        if total == 0 {
            reporter.on_progress(100);
            return false;
        }

        let pool_size = self.options.pool_size();
        let cooperative = self.options.stop_policy == StopPolicy::Cooperative;
        debug!(
            "sweeping {total} targets, pool size {pool_size}, timeout {timeout:?}, stop policy {:?}",
            self.options.stop_policy
        );

        let sem = Arc::new(Semaphore::new(pool_size));
        let mut set = JoinSet::new();

        for target in targets {
            if self.abort.is_cancelled() || (cooperative && self.stop.is_cancelled()) {
                break;
            }
            let permit = tokio::select! {
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                _ = self.abort.cancelled() => break,
            };
            // reap finished units so the set stays pool-sized
            while set.try_join_next().is_some() {}

            let unit = SweepUnit {
                prober: Arc::clone(&self.prober),
                resolver: Arc::clone(&self.resolver),
                results: self.results.clone(),
                reporter: Arc::clone(reporter),
                stop: cooperative.then(|| self.stop.clone()),
                timeout,
                total,
            };
            set.spawn(async move {
                let _permit = permit; // keep permit until the unit completes
                unit.run(target).await;
            });
        }

        // No more submissions; wait for the pool to drain.
        let mut grace_expired = false;
        tokio::select! {
            res = time::timeout(self.options.grace_period(), drain(&mut set)) => {
                if res.is_err() {
                    grace_expired = true;
                    warn!(
                        "grace period of {:?} elapsed, cancelling {} outstanding probes",
                        self.options.grace_period(),
                        set.len()
                    );
                }
            }
            _ = self.abort.cancelled() => {
                warn!("shutdown requested, cancelling {} outstanding probes", set.len());
            }
        }
        set.shutdown().await;
        grace_expired
    }

    /// Probe one host once per interval until the count is reached or a stop arrives.
    async fn ping(
        &self,
        address: Ipv4Addr,
        interval_ms: u64,
        count: u32,
        continuous: bool,
        reporter: &Arc<dyn ProgressReporter>,
    ) {
        self.results.reset(if continuous { 0 } else { u64::from(count) });
        reporter.on_progress(0);

        let interval = ms(interval_ms);
        let target = IpAddr::V4(address);
        let mut attempts = 0u32;
        let mut successes = 0u32;
        let mut deadline = Instant::now() + interval;
        debug!("pinging {address} every {interval:?}, count {count}, continuous {continuous}");

        while (attempts < count || continuous) && !self.stop.is_cancelled() {
            let (reachable, rtt) = tokio::select! {
                res = self.prober.probe_latency(target, interval) => res,
                _ = self.abort.cancelled() => break,
            };

            attempts = attempts.saturating_add(1);
            if reachable {
                successes = successes.saturating_add(1);
            }
            let sample = PingSample {
                // a failed attempt costs one full interval
                round_trip_ms: if reachable {
                    u64::try_from(rtt.as_millis()).unwrap_or(interval_ms)
                } else {
                    interval_ms
                },
                success: reachable,
                loss_percent: stats::loss_percent(successes, attempts),
            };
            trace!("ping {address} #{attempts}: {sample:?}");

            let verdict = Verdict::PingSample(sample);
            reporter.on_result(&verdict);
            self.results.push(verdict);
            let done = self.results.mark_scanned();
            if !continuous {
                reporter.on_progress(percent(done, u64::from(count)));
            }

            // sleep_until a past deadline returns at once
            tokio::select! {
                _ = time::sleep_until(deadline) => {}
                _ = self.stop.cancelled() => break,
            }
            deadline += interval;
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One pool task: probe, record a positive, count, report.
struct SweepUnit {
    prober: Arc<dyn Prober>,
    resolver: Arc<ProtocolResolver>,
    results: ResultSet,
    reporter: Arc<dyn ProgressReporter>,
    stop: Option<CancellationToken>,
    timeout: Duration,
    total: u64,
}

impl SweepUnit {
    async fn run(self, target: ScanTarget) {
        if self.stop.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return;
        }

        let verdict = match target {
            ScanTarget::Address(ip) => self
                .prober
                .probe_host(IpAddr::V4(ip), self.timeout)
                .await
                .then_some(Verdict::HostUp { address: ip }),
            ScanTarget::Port(ip, port) => {
                let open = self.prober.probe_port(IpAddr::V4(ip), port, self.timeout).await;
                open.then(|| Verdict::PortOpen {
                    port,
                    protocol: self.resolver.lookup(port).to_string(),
                })
            }
        };

        if let Some(verdict) = verdict {
            self.reporter.on_result(&verdict);
            self.results.push(verdict);
        }
        let done = self.results.mark_scanned();
        self.reporter.on_progress(percent(done, self.total));
    }
}

async fn drain(set: &mut JoinSet<()>) {
    while set.join_next().await.is_some() {}
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
