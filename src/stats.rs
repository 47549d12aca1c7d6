use serde::{Deserialize, Serialize};

use crate::types::PingSample;

/// Summary metrics over a ping run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PingSummary {
    /// Smallest round trip over all samples, failed ones counted at the full interval.
    pub min_rtt_ms: Option<u64>,
    pub max_rtt_ms: Option<u64>,
    /// Mean over successful samples only, two decimals. `None` without successes.
    pub average_rtt_ms: Option<f64>,
    pub total: u32,
    pub successes: u32,
    pub failures: u32,
    pub loss_percent: f64,
}

/// Round half away from zero to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `round2((1 - successes/attempts) * 100)`; zero attempts count as no loss.
pub fn loss_percent(successes: u32, attempts: u32) -> f64 {
    if attempts == 0 {
        return 0.0;
    }
    round2((1.0 - f64::from(successes) / f64::from(attempts)) * 100.0)
}

pub fn min_round_trip(samples: &[PingSample]) -> Option<u64> {
    samples.iter().map(|s| s.round_trip_ms).min()
}

pub fn max_round_trip(samples: &[PingSample]) -> Option<u64> {
    samples.iter().map(|s| s.round_trip_ms).max()
}

pub fn average_round_trip(samples: &[PingSample]) -> Option<f64> {
    let (sum, n) = samples
        .iter()
        .filter(|s| s.success)
        .fold((0u64, 0u32), |(sum, n), s| (sum + s.round_trip_ms, n + 1));
    if n == 0 {
        return None;
    }
    Some(round2(sum as f64 / f64::from(n)))
}

/// Derive the run summary from samples in issue order.
pub fn summarize(samples: &[PingSample]) -> PingSummary {
    let total = u32::try_from(samples.len()).unwrap_or(u32::MAX);
    let successes = u32::try_from(samples.iter().filter(|s| s.success).count()).unwrap_or(u32::MAX);
    PingSummary {
        min_rtt_ms: min_round_trip(samples),
        max_rtt_ms: max_round_trip(samples),
        average_rtt_ms: average_round_trip(samples),
        total,
        successes,
        failures: total - successes,
        loss_percent: loss_percent(successes, total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(rtt: u64, success: bool) -> PingSample {
        PingSample {
            round_trip_ms: rtt,
            success,
            loss_percent: 0.0,
        }
    }

    #[test]
    fn mixed_samples() {
        let samples = [sample(50, true), sample(100, false), sample(30, true)];
        let s = summarize(&samples);
        assert_eq!(s.min_rtt_ms, Some(30));
        assert_eq!(s.max_rtt_ms, Some(100));
        assert_eq!(s.average_rtt_ms, Some(40.0));
        assert_eq!(s.loss_percent, 33.33);
        assert_eq!((s.total, s.successes, s.failures), (3, 2, 1));
    }

    #[test]
    fn no_samples_is_guarded() {
        let s = summarize(&[]);
        assert_eq!(s.min_rtt_ms, None);
        assert_eq!(s.max_rtt_ms, None);
        assert_eq!(s.average_rtt_ms, None);
        assert_eq!(s.loss_percent, 0.0);
    }

    #[test]
    fn all_failed_has_no_average() {
        let samples = [sample(200, false), sample(200, false)];
        let s = summarize(&samples);
        assert_eq!(s.average_rtt_ms, None);
        assert_eq!(s.loss_percent, 100.0);
    }

    #[test]
    fn loss_rounding() {
        assert_eq!(loss_percent(2, 3), 33.33);
        assert_eq!(loss_percent(1, 3), 66.67);
        assert_eq!(loss_percent(0, 0), 0.0);
        assert_eq!(round2(12.345_6), 12.35);
    }
}
