use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::types::{PingSample, Verdict};

/// Append-only verdict sink plus the progress counters of one run.
///
/// Cloning yields another handle to the same set, so pool workers can append
/// concurrently while the owner reads progress.
#[derive(Clone, Debug, Default)]
pub struct ResultSet {
    scanned: Arc<AtomicU64>,
    total: Arc<AtomicU64>,
    verdicts: Arc<Mutex<Vec<Verdict>>>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reset(&self, total: u64) {
        self.lock().clear();
        self.scanned.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
    }

    pub fn push(&self, verdict: Verdict) {
        self.lock().push(verdict);
    }

    /// Count one finished probe and return the new completed count.
    pub fn mark_scanned(&self) -> u64 {
        self.scanned.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn scanned(&self) -> u64 {
        self.scanned.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    /// scanned / total in `0.0..=1.0`. An empty run counts as done.
    pub fn fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 1.0;
        }
        (self.scanned() as f64 / total as f64).min(1.0)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of the verdicts in insertion order.
    pub fn snapshot(&self) -> Vec<Verdict> {
        self.lock().clone()
    }

    pub fn ping_samples(&self) -> Vec<PingSample> {
        self.lock()
            .iter()
            .filter_map(Verdict::as_ping_sample)
            .copied()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Verdict>> {
        // A panicking writer cannot leave a half-pushed Vec behind.
        self.verdicts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// `round(100 * completed / total)`, 100 for an empty run.
pub fn percent(completed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let pct = (100.0 * completed.min(total) as f64 / total as f64).round();
    pct as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::thread;

    #[test]
    fn concurrent_appends_are_all_kept() {
        let set = ResultSet::new();
        set.reset(800);
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let set = set.clone();
                thread::spawn(move || {
                    for i in 0..100u8 {
                        set.push(Verdict::HostUp {
                            address: Ipv4Addr::new(10, t, 0, i),
                        });
                        set.mark_scanned();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(set.len(), 800);
        assert_eq!(set.scanned(), 800);
        assert_eq!(set.fraction(), 1.0);
    }

    #[test]
    fn percent_is_monotonic_and_ends_at_100() {
        let n = 7;
        let values: Vec<u8> = (0..=n).map(|k| percent(k, n)).collect();
        assert!(values.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(percent(n, n), 100);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn reset_clears_previous_run() {
        let set = ResultSet::new();
        set.reset(2);
        set.push(Verdict::PortOpen {
            port: 22,
            protocol: "SSH".into(),
        });
        set.mark_scanned();
        set.reset(5);
        assert!(set.is_empty());
        assert_eq!(set.scanned(), 0);
        assert_eq!(set.total(), 5);
    }
}
