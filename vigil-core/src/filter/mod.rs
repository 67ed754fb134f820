//! Tiered statistical alert filter.
//!
//! Stage 1 is a robust MAD outlier check that can fire regardless of data
//! volume. Stage 2 routes by how much history exists: too little and we
//! stay quiet, a medium amount and the HMM verdict must be confirmed by a
//! permutation test, plenty and the HMM verdict stands alone.

pub mod hmm;
pub mod mad;
pub mod permutation;

pub use hmm::{HmmModel, HmmState};
pub use mad::MadModel;
pub use permutation::PermutationTest;

use crate::config::AnalyzerConfig;
use crate::model::AlertDecision;
use chrono::{DateTime, Utc};
use tracing::debug;

pub const REASON_FIRST_EVENT: &str = "first event sequence";
pub const REASON_MAD_BURST: &str = "MAD burst anomaly";
pub const REASON_LOW_DATA: &str = "Low data, MAD negative";

/// Decides per signature whether the observed event stream is an actionable
/// burst given its rolling history.
pub struct AlertFilter {
    mad: MadModel,
    hmm: HmmModel,
    permutation: PermutationTest,
    trust_threshold: usize,
    confidence_threshold: usize,
}

impl AlertFilter {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let mut permutation = PermutationTest::new(config.permutation_n, config.permutation_alpha);
        if let Some(seed) = config.permutation_seed {
            permutation = permutation.with_seed(seed);
        }
        Self {
            mad: MadModel::new(config.mad_z_threshold),
            hmm: HmmModel::new(),
            permutation,
            trust_threshold: config.hmm_trust_threshold,
            confidence_threshold: config.hmm_confidence_threshold,
        }
    }

    /// Evaluate one signature's current events against its history window.
    pub fn evaluate(
        &self,
        historical: &[DateTime<Utc>],
        current: &[DateTime<Utc>],
    ) -> AlertDecision {
        // Sorted multiset merge: duplicated history writes are tolerated
        // and must never swallow current events.
        let mut merged: Vec<DateTime<Utc>> = Vec::with_capacity(historical.len() + current.len());
        merged.extend_from_slice(historical);
        merged.extend_from_slice(current);
        merged.sort();

        if merged.len() < 2 {
            // Nothing to compare against: surface it rather than filter it.
            return AlertDecision::alert(REASON_FIRST_EVENT).with_detail("events", merged.len());
        }

        let intervals = intervals_in_hours(&merged);
        let new_interval = *intervals.last().expect("at least one interval");
        let history_for_model = &intervals[..intervals.len() - 1];

        // Stage 1: MAD gets the first word regardless of zone.
        if self.mad.is_burst(new_interval, history_for_model) {
            debug!(new_interval, "MAD flagged burst");
            return AlertDecision::alert(REASON_MAD_BURST)
                .with_detail("intervals", intervals.len())
                .with_detail("new_interval_hr", format!("{:.4}", new_interval));
        }

        // Stage 2: zone routing by data volume.
        if intervals.len() < self.trust_threshold {
            return AlertDecision::suppress(REASON_LOW_DATA)
                .with_detail("zone", 1)
                .with_detail("intervals", intervals.len());
        }

        let state = self.hmm.predict_final_state(history_for_model, new_interval);
        debug!(?state, intervals = intervals.len(), "HMM verdict");

        if intervals.len() < self.confidence_threshold {
            // Zone 2: the HMM is trusted only with independent confirmation.
            if state != HmmState::Burst {
                return AlertDecision::suppress("HMM negative")
                    .with_detail("zone", 2)
                    .with_detail("hmm_state", format!("{:?}", state));
            }
            if self.permutation.has_burst_pattern(&intervals) {
                AlertDecision::alert("HMM burst confirmed by permutation test")
                    .with_detail("zone", 2)
                    .with_detail("intervals", intervals.len())
            } else {
                AlertDecision::suppress("HMM burst unconfirmed by permutation test")
                    .with_detail("zone", 2)
                    .with_detail("intervals", intervals.len())
            }
        } else {
            // Zone 3: enough data to let the HMM speak for itself.
            if state == HmmState::Burst {
                AlertDecision::alert("HMM burst anomaly")
                    .with_detail("zone", 3)
                    .with_detail("intervals", intervals.len())
            } else {
                AlertDecision::suppress("HMM negative")
                    .with_detail("zone", 3)
                    .with_detail("hmm_state", format!("{:?}", state))
            }
        }
    }
}

fn intervals_in_hours(timestamps: &[DateTime<Utc>]) -> Vec<f64> {
    timestamps
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 3_600_000.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn filter() -> AlertFilter {
        let config = AnalyzerConfig {
            permutation_seed: Some(42),
            ..Default::default()
        };
        AlertFilter::new(&config)
    }

    /// Build timestamps from a starting point and a list of gaps in hours.
    fn timestamps_from_intervals(intervals: &[f64]) -> Vec<DateTime<Utc>> {
        let mut current = Utc.with_ymd_and_hms(2025, 6, 20, 0, 0, 0).unwrap();
        let mut out = vec![current];
        for &gap in intervals {
            current += Duration::milliseconds((gap * 3_600_000.0) as i64);
            out.push(current);
        }
        out
    }

    #[test]
    fn test_first_event_sequence() {
        let decision = filter().evaluate(&[], &timestamps_from_intervals(&[]));
        assert!(decision.alert);
        assert_eq!(decision.reason, REASON_FIRST_EVENT);
    }

    #[test]
    fn test_single_history_single_current() {
        // One interval total: zone 1, MAD falls back to its sparse check.
        let all = timestamps_from_intervals(&[0.9]);
        let decision = filter().evaluate(&all[..1], &all[1..]);
        assert!(!decision.alert);
        assert_eq!(decision.reason, REASON_LOW_DATA);

        let fast = timestamps_from_intervals(&[0.01]);
        let decision = filter().evaluate(&fast[..1], &fast[1..]);
        assert!(decision.alert);
        assert_eq!(decision.reason, REASON_MAD_BURST);
    }

    #[test]
    fn test_mad_burst_with_stable_history() {
        // 19 steady hours, one fast gap, then an even faster event: MAD's
        // zero-deviation branch flags it before any zone routing.
        let mut intervals = vec![1.0; 19];
        intervals.push(0.05);
        intervals.push(0.02);
        let all = timestamps_from_intervals(&intervals);
        let (history, current) = all.split_at(all.len() - 1);
        let decision = filter().evaluate(history, current);
        assert!(decision.alert);
        assert_eq!(decision.reason, REASON_MAD_BURST);
    }

    #[test]
    fn test_zone1_quiet() {
        let intervals = vec![0.9, 1.1, 0.95, 1.05, 1.0, 0.9, 1.1, 0.95, 1.05, 1.0, 0.9];
        let all = timestamps_from_intervals(&intervals);
        let (history, current) = all.split_at(all.len() - 1);
        let decision = filter().evaluate(history, current);
        assert!(!decision.alert);
        assert_eq!(decision.reason, REASON_LOW_DATA);
        assert_eq!(decision.details.get("zone").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_zone2_hmm_negative() {
        // 25 steady intervals, newest one ordinary: nothing to report.
        let intervals: Vec<f64> = (0..25)
            .map(|i| if i % 2 == 0 { 0.9 } else { 1.1 })
            .collect();
        let all = timestamps_from_intervals(&intervals);
        let (history, current) = all.split_at(all.len() - 1);
        let decision = filter().evaluate(history, current);
        assert!(!decision.alert);
        assert_eq!(decision.reason, "HMM negative");
    }

    #[test]
    fn test_zone2_burst_confirmed() {
        // Bimodal history, then a sustained run of fast events ending in an
        // even faster one: HMM says burst, permutation agrees.
        let mut intervals = Vec::new();
        for _ in 0..10 {
            intervals.push(1.8);
            intervals.push(0.2);
        }
        intervals.extend(vec![0.05; 7]);
        intervals.push(0.02);
        assert!(intervals.len() >= 20 && intervals.len() < 40);

        let all = timestamps_from_intervals(&intervals);
        let (history, current) = all.split_at(all.len() - 1);
        let decision = filter().evaluate(history, current);
        assert!(decision.alert, "expected alert, got {:?}", decision);
        assert_eq!(decision.reason, "HMM burst confirmed by permutation test");
    }

    #[test]
    fn test_zone2_burst_vetoed_by_permutation() {
        // Fast gaps are routine here (every other event), so the recent
        // window is no faster than the rest and the permutation test's
        // direction guard rejects the shift, overriding the HMM.
        let longs = [
            1.0, 1.15, 1.3, 1.45, 1.6, 1.75, 1.9, 2.05, 2.2, 2.35, 2.5, 2.65, 2.8, 2.95,
        ];
        let shorts = [
            0.03, 0.04, 0.05, 0.06, 0.04, 0.05, 0.03, 0.06, 0.05, 0.04, 0.05, 0.03, 0.06,
        ];
        let mut intervals = Vec::new();
        for i in 0..13 {
            intervals.push(longs[i]);
            intervals.push(shorts[i]);
        }
        intervals.push(longs[13]);
        intervals.push(0.02);
        assert!(intervals.len() >= 20 && intervals.len() < 40);

        let all = timestamps_from_intervals(&intervals);
        let (history, current) = all.split_at(all.len() - 1);
        let decision = filter().evaluate(history, current);
        assert!(!decision.alert, "expected veto, got {:?}", decision);
        assert_eq!(decision.reason, "HMM burst unconfirmed by permutation test");
    }

    #[test]
    fn test_zone3_hmm_burst() {
        // Same alternating texture, scaled past the confidence threshold:
        // the HMM verdict stands alone.
        let longs: Vec<f64> = (0..20).map(|i| 1.0 + 0.1 * i as f64).collect();
        let shorts = [0.03, 0.04, 0.05, 0.06];
        let mut intervals = Vec::new();
        for i in 0..19 {
            intervals.push(longs[i]);
            intervals.push(shorts[i % shorts.len()]);
        }
        intervals.push(longs[19]);
        intervals.push(0.02);
        assert!(intervals.len() >= 40);

        let all = timestamps_from_intervals(&intervals);
        let (history, current) = all.split_at(all.len() - 1);
        let decision = filter().evaluate(history, current);
        assert!(decision.alert, "expected alert, got {:?}", decision);
        assert_eq!(decision.reason, "HMM burst anomaly");
    }

    #[test]
    fn test_zone3_quiet() {
        let intervals: Vec<f64> = (0..45)
            .map(|i| if i % 2 == 0 { 0.9 } else { 1.1 })
            .collect();
        let all = timestamps_from_intervals(&intervals);
        let (history, current) = all.split_at(all.len() - 1);
        let decision = filter().evaluate(history, current);
        assert!(!decision.alert);
        assert_eq!(decision.reason, "HMM negative");
        assert_eq!(decision.details.get("zone").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_unsorted_inputs_are_merged() {
        // Current events interleave with history; the filter sees one
        // chronological sequence.
        let all = timestamps_from_intervals(&[1.0, 1.0, 1.0, 1.0]);
        let history = vec![all[0], all[2], all[4]];
        let current = vec![all[1], all[3]];
        let decision = filter().evaluate(&history, &current);
        assert!(!decision.alert);
        assert_eq!(decision.reason, REASON_LOW_DATA);
    }
}
