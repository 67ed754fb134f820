use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

const MIN_SAMPLE_SIZE: usize = 5;

/// Non-parametric confirmation that the recent sub-window of intervals has a
/// significantly lower mean than the rest, i.e. that a burst pattern has
/// emerged. No distributional assumptions, just shuffles.
#[derive(Debug, Clone)]
pub struct PermutationTest {
    n_permutations: usize,
    alpha: f64,
    seed: Option<u64>,
}

impl PermutationTest {
    pub fn new(n_permutations: usize, alpha: f64) -> Self {
        Self {
            n_permutations,
            alpha,
            seed: None,
        }
    }

    /// Fix the RNG seed so repeated runs over the same data agree.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Tests whether the last `max(5, n/4)` intervals are significantly
    /// faster than the earlier ones.
    pub fn has_burst_pattern(&self, intervals: &[f64]) -> bool {
        let n = intervals.len();
        let recent_window = MIN_SAMPLE_SIZE.max(n / 4);
        if n < recent_window + MIN_SAMPLE_SIZE {
            debug!(n, recent_window, "permutation test: insufficient data");
            return false;
        }

        let split = n - recent_window;
        let (historical, recent) = intervals.split_at(split);

        let mean_recent = mean(recent);
        let mean_historical = mean(historical);
        let observed_difference = mean_recent - mean_historical;

        // Bursts mean smaller intervals; anything else is the wrong
        // direction for this test.
        if observed_difference >= 0.0 {
            return false;
        }

        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut pooled: Vec<f64> = intervals.to_vec();
        let mut count_extreme = 0usize;
        for _ in 0..self.n_permutations {
            pooled.shuffle(&mut rng);
            let pseudo_recent = mean(&pooled[..recent.len()]);
            let pseudo_historical = mean(&pooled[recent.len()..]);
            if pseudo_recent - pseudo_historical <= observed_difference {
                count_extreme += 1;
            }
        }

        let p_value = count_extreme as f64 / self.n_permutations as f64;
        debug!(observed_difference, p_value, "permutation test result");
        p_value < self.alpha
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
