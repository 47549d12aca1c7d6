use std::sync::atomic::{AtomicU8, Ordering};

use crate::stats::PingSummary;
use crate::types::Verdict;

/// Receives live notifications from a running scan.
///
/// Sweep runs call in from pool workers, so implementations must be `Send + Sync`
/// and return quickly.
pub trait ProgressReporter: Send + Sync {
    fn on_progress(&self, percent: u8);

    fn on_result(&self, verdict: &Verdict);

    fn on_complete(&self, _summary: Option<&PingSummary>) {}
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_progress(&self, _percent: u8) {}

    fn on_result(&self, _verdict: &Verdict) {}
}

/// Prints results as they arrive and progress in steps of ten percent.
#[derive(Debug, Default)]
pub struct ConsoleReporter {
    last_step: AtomicU8,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressReporter for ConsoleReporter {
    fn on_progress(&self, percent: u8) {
        // callbacks may arrive out of order; only ever print forward
        let step = percent / 10;
        if self.last_step.fetch_max(step, Ordering::Relaxed) < step {
            println!("  progress: {percent:>3}%");
        }
    }

    fn on_result(&self, verdict: &Verdict) {
        match verdict {
            Verdict::HostUp { address } => println!("  host up    {address}"),
            Verdict::PortOpen { port, protocol } => {
                println!("  port open  {port:>5}  {protocol}")
            }
            Verdict::PingSample(s) => println!(
                "  reply={:<5} rtt={:>5} ms  loss={:.2}%",
                s.success, s.round_trip_ms, s.loss_percent
            ),
        }
    }

    fn on_complete(&self, summary: Option<&PingSummary>) {
        let Some(s) = summary else {
            println!("  done.");
            return;
        };
        let fmt_ms = |v: Option<u64>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
        println!(
            "\n  rtt min/max/avg: {}/{}/{} ms",
            fmt_ms(s.min_rtt_ms),
            fmt_ms(s.max_rtt_ms),
            s.average_rtt_ms
                .map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
        );
        println!(
            "  packets: sent={} received={} lost={} ({:.2}% loss)",
            s.total, s.successes, s.failures, s.loss_percent
        );
    }
}
