use tracing::debug;

/// Hidden states of the event-timing model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HmmState {
    Normal,
    Burst,
    Silent,
}

impl HmmState {
    fn index(self) -> usize {
        match self {
            HmmState::Normal => 0,
            HmmState::Burst => 1,
            HmmState::Silent => 2,
        }
    }

    fn from_index(index: usize) -> Self {
        match index {
            0 => HmmState::Normal,
            1 => HmmState::Burst,
            _ => HmmState::Silent,
        }
    }
}

const NUM_STATES: usize = 3;
const MAX_ITERATIONS: usize = 10;
const CONVERGENCE_TOLERANCE: f64 = 1e-4;
const VITERBI_BASELINE_WINDOW: usize = 20;
const EPSILON: f64 = 1e-9;

/// Learned model parameters: state transition matrix and per-state rates of
/// the exponential gap distribution.
#[derive(Debug, Clone)]
pub struct HmmParams {
    transitions: [[f64; NUM_STATES]; NUM_STATES],
    lambdas: [f64; NUM_STATES],
}

/// Per-state Viterbi log-probabilities after some number of observations.
#[derive(Debug, Clone)]
struct ViterbiTrellis {
    log_probs: [f64; NUM_STATES],
}

impl ViterbiTrellis {
    fn uniform() -> Self {
        Self {
            log_probs: [(1.0f64 / NUM_STATES as f64).ln(); NUM_STATES],
        }
    }
}

/// Self-learning three-state (Normal / Burst / Silent) hidden Markov model
/// over inter-event intervals, with exponential emissions.
///
/// Parameters are learned per invocation from the history window via
/// Baum-Welch; nothing persists across runs.
#[derive(Debug, Default)]
pub struct HmmModel;

impl HmmModel {
    pub fn new() -> Self {
        Self
    }

    /// Learn from `intervals_hr` and classify `new_interval_hr`.
    ///
    /// The caller gates this behind a minimum history size; short or empty
    /// inputs still produce a (low-value) verdict rather than an error.
    pub fn predict_final_state(&self, intervals_hr: &[f64], new_interval_hr: f64) -> HmmState {
        let params = self.learn_parameters(intervals_hr);
        debug!(?params, "HMM parameters learned");

        // Establish a baseline state from the tail of the training data,
        // then take one more step on the fresh interval.
        let mut trellis = ViterbiTrellis::uniform();
        let baseline_start = intervals_hr.len().saturating_sub(VITERBI_BASELINE_WINDOW);
        for &interval in &intervals_hr[baseline_start..] {
            trellis = viterbi_step(&trellis, interval, &params).0;
        }

        let (_, state) = viterbi_step(&trellis, new_interval_hr, &params);
        state
    }

    fn learn_parameters(&self, intervals: &[f64]) -> HmmParams {
        let mut params = initial_parameters(intervals);
        if intervals.is_empty() {
            return params;
        }

        for iteration in 0..MAX_ITERATIONS {
            let obs = observation_log_probs(intervals, &params.lambdas);
            let (alpha, beta) = forward_backward(intervals.len(), &params.transitions, &obs);
            let updated = reestimate(intervals, &params.transitions, &alpha, &beta, &obs);

            let change = l1_change(&params, &updated);
            params = updated;
            if change < CONVERGENCE_TOLERANCE {
                debug!(iterations = iteration + 1, "Baum-Welch converged");
                return params;
            }
        }
        debug!("Baum-Welch reached max iterations");
        params
    }
}

fn initial_parameters(intervals: &[f64]) -> HmmParams {
    let transitions = [
        [0.90, 0.08, 0.02], // Normal -> (Normal, Burst, Silent)
        [0.20, 0.79, 0.01], // Burst  -> (Normal, Burst, Silent)
        [0.30, 0.01, 0.69], // Silent -> (Normal, Burst, Silent)
    ];
    let mean_normal = if intervals.is_empty() {
        24.0
    } else {
        intervals.iter().sum::<f64>() / intervals.len() as f64
    };
    let lambdas = [
        1.0 / mean_normal.max(EPSILON),
        1.0 / (mean_normal * 0.05).max(EPSILON),
        1.0 / (mean_normal * 10.0).max(EPSILON),
    ];
    HmmParams {
        transitions,
        lambdas,
    }
}

/// Log-density of an exponential gap of `interval` hours at rate `lambda`.
fn emission_log_prob(interval: f64, lambda: f64) -> f64 {
    lambda.max(EPSILON).ln() - lambda * interval
}

fn observation_log_probs(intervals: &[f64], lambdas: &[f64; NUM_STATES]) -> Vec<[f64; NUM_STATES]> {
    intervals
        .iter()
        .map(|&x| {
            let mut row = [0.0; NUM_STATES];
            for (state, &lambda) in lambdas.iter().enumerate() {
                row[state] = emission_log_prob(x, lambda);
            }
            row
        })
        .collect()
}

fn log_transition(transitions: &[[f64; NUM_STATES]; NUM_STATES], from: usize, to: usize) -> f64 {
    transitions[from][to].max(EPSILON).ln()
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

#[allow(clippy::type_complexity)]
fn forward_backward(
    num_obs: usize,
    transitions: &[[f64; NUM_STATES]; NUM_STATES],
    obs: &[[f64; NUM_STATES]],
) -> (Vec<[f64; NUM_STATES]>, Vec<[f64; NUM_STATES]>) {
    let uniform = (1.0f64 / NUM_STATES as f64).ln();

    let mut alpha = vec![[0.0f64; NUM_STATES]; num_obs];
    for state in 0..NUM_STATES {
        alpha[0][state] = uniform + obs[0][state];
    }
    for t in 1..num_obs {
        for j in 0..NUM_STATES {
            let terms: Vec<f64> = (0..NUM_STATES)
                .map(|i| alpha[t - 1][i] + log_transition(transitions, i, j))
                .collect();
            alpha[t][j] = obs[t][j] + log_sum_exp(&terms);
        }
    }

    let mut beta = vec![[0.0f64; NUM_STATES]; num_obs];
    for t in (0..num_obs.saturating_sub(1)).rev() {
        for i in 0..NUM_STATES {
            let terms: Vec<f64> = (0..NUM_STATES)
                .map(|j| beta[t + 1][j] + log_transition(transitions, i, j) + obs[t + 1][j])
                .collect();
            beta[t][i] = log_sum_exp(&terms);
        }
    }

    (alpha, beta)
}

fn reestimate(
    intervals: &[f64],
    transitions: &[[f64; NUM_STATES]; NUM_STATES],
    alpha: &[[f64; NUM_STATES]],
    beta: &[[f64; NUM_STATES]],
    obs: &[[f64; NUM_STATES]],
) -> HmmParams {
    let num_obs = intervals.len();

    // State posteriors and expected transition counts.
    let mut gamma = vec![[0.0f64; NUM_STATES]; num_obs];
    let mut xi_sums = [[0.0f64; NUM_STATES]; NUM_STATES];
    for t in 0..num_obs {
        let joint: Vec<f64> = (0..NUM_STATES).map(|i| alpha[t][i] + beta[t][i]).collect();
        let denominator = log_sum_exp(&joint);
        for i in 0..NUM_STATES {
            gamma[t][i] = (joint[i] - denominator).exp();
        }
        if t + 1 < num_obs {
            for i in 0..NUM_STATES {
                for j in 0..NUM_STATES {
                    let numerator = alpha[t][i]
                        + log_transition(transitions, i, j)
                        + beta[t + 1][j]
                        + obs[t + 1][j];
                    xi_sums[i][j] += (numerator - denominator).exp();
                }
            }
        }
    }

    let mut new_transitions = [[0.0f64; NUM_STATES]; NUM_STATES];
    for i in 0..NUM_STATES {
        let gamma_sum: f64 = gamma[..num_obs.saturating_sub(1)].iter().map(|g| g[i]).sum();
        let divisor = if gamma_sum > 0.0 { gamma_sum } else { 1.0 };
        for j in 0..NUM_STATES {
            new_transitions[i][j] = xi_sums[i][j] / divisor;
        }
    }

    let mut new_lambdas = [0.0f64; NUM_STATES];
    for i in 0..NUM_STATES {
        let gamma_sum: f64 = gamma.iter().map(|g| g[i]).sum();
        let weighted: f64 = gamma
            .iter()
            .zip(intervals)
            .map(|(g, &x)| g[i] * x)
            .sum();
        new_lambdas[i] = gamma_sum / weighted.max(EPSILON);
    }

    HmmParams {
        transitions: new_transitions,
        lambdas: new_lambdas,
    }
}

fn l1_change(old: &HmmParams, new: &HmmParams) -> f64 {
    let mut change = 0.0;
    for i in 0..NUM_STATES {
        for j in 0..NUM_STATES {
            change += (new.transitions[i][j] - old.transitions[i][j]).abs();
        }
        change += (new.lambdas[i] - old.lambdas[i]).abs();
    }
    change
}

/// One Viterbi step: extend the best path with `interval` and report the
/// most likely current state.
fn viterbi_step(
    prev: &ViterbiTrellis,
    interval: f64,
    params: &HmmParams,
) -> (ViterbiTrellis, HmmState) {
    let mut next = ViterbiTrellis {
        log_probs: [f64::NEG_INFINITY; NUM_STATES],
    };
    for dest in 0..NUM_STATES {
        let best_path = (0..NUM_STATES)
            .map(|src| prev.log_probs[src] + log_transition(&params.transitions, src, dest))
            .fold(f64::NEG_INFINITY, f64::max);
        next.log_probs[dest] = best_path + emission_log_prob(interval, params.lambdas[dest]);
    }

    let best_state = (0..NUM_STATES)
        .max_by(|&a, &b| {
            next.log_probs[a]
                .partial_cmp(&next.log_probs[b])
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .unwrap_or(0);
    (next, HmmState::from_index(best_state))
}
