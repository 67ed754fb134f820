/// Robust interval-outlier check based on Median Absolute Deviation.
///
/// Only the burst side fires: a modified z-score far below zero means the
/// newest gap is much shorter than usual. Long silences are left to other
/// models.
#[derive(Debug, Clone)]
pub struct MadModel {
    z_threshold: f64,
}

/// Fallback burst cutoff in hours when history is too thin for MAD.
const SPARSE_BURST_CUTOFF_HR: f64 = 0.1;

impl MadModel {
    pub fn new(z_threshold: f64) -> Self {
        Self { z_threshold }
    }

    /// Does `new_interval_hr` look like a burst against `history`?
    pub fn is_burst(&self, new_interval_hr: f64, history: &[f64]) -> bool {
        if history.len() < 2 {
            // Not enough data for MAD: only very fast events count.
            return new_interval_hr < SPARSE_BURST_CUTOFF_HR;
        }

        let med = median(history);
        let deviations: Vec<f64> = history.iter().map(|x| (x - med).abs()).collect();
        let mad = median(&deviations);

        if mad == 0.0 {
            // All historical intervals identical: a burst needs a strictly
            // smaller gap, equality stays quiet.
            return new_interval_hr < med;
        }

        let modified_z = 0.6745 * (new_interval_hr - med) / mad;
        modified_z < -self.z_threshold
    }
}

pub(crate) fn median(values: &[f64]) -> f64 {
    debug_assert!(!values.is_empty());
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> MadModel {
        MadModel::new(3.5)
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert_eq!(median(&[5.0]), 5.0);
    }

    #[test]
    fn test_sparse_history_fallback() {
        assert!(model().is_burst(0.02, &[]));
        assert!(model().is_burst(0.05, &[1.0]));
        assert!(!model().is_burst(0.5, &[1.0]));
    }

    #[test]
    fn test_zero_mad_strict_comparison() {
        let history = vec![1.0; 19];
        // Equal to the stable median: not a burst.
        assert!(!model().is_burst(1.0, &history));
        // Strictly smaller: burst.
        assert!(model().is_burst(0.02, &history));
        // Larger (silence): never flagged here.
        assert!(!model().is_burst(5.0, &history));
    }

    #[test]
    fn test_mad_zero_with_trailing_outlier() {
        // 19 steady intervals plus one fast one: median 1.0, MAD still 0.
        let mut history = vec![1.0; 19];
        history.push(0.05);
        assert!(model().is_burst(0.02, &history));
    }

    #[test]
    fn test_within_bounds_is_quiet() {
        let history = vec![0.9, 1.0, 1.1, 1.0, 0.95, 1.05, 1.0, 0.98, 1.02, 1.0];
        assert!(!model().is_burst(0.9, &history));
    }

    #[test]
    fn test_extreme_burst_fires() {
        let history = vec![0.9, 1.0, 1.1, 1.0, 0.95, 1.05, 1.0, 0.98, 1.02, 1.0];
        assert!(model().is_burst(0.001, &history));
    }

    #[test]
    fn test_long_silence_not_flagged() {
        let history = vec![0.9, 1.0, 1.1, 1.0, 0.95, 1.05, 1.0, 0.98, 1.02, 1.0];
        assert!(!model().is_burst(300.0, &history));
    }

    #[test]
    fn test_monotonic_in_new_interval() {
        // If an interval fires, every shorter interval fires too.
        let history = vec![0.5, 1.0, 1.5, 1.0, 0.75, 1.25, 1.0, 0.9, 1.1, 1.0];
        let model = model();
        let mut fired = false;
        for step in (0..=150).rev() {
            let interval = step as f64 * 0.01;
            let result = model.is_burst(interval, &history);
            if fired {
                assert!(result, "burst flag lost at interval {}", interval);
            }
            fired = fired || result;
        }
        assert!(fired);
    }
}
