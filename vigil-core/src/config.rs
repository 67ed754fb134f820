use crate::error::VigilError;
use crate::model::Severity;
use serde::{Deserialize, Serialize};
use std::env;

/// Tunables for the analysis pipeline. Defaults match production; every
/// field can be overridden through a `VIGIL_`-prefixed environment variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Events below this severity rank are dropped by the parser.
    pub min_severity: Severity,
    /// Write-time TTL on history records, in hours.
    pub history_ttl_hours: i64,
    /// Minimum interval count before the HMM verdict is considered at all.
    pub hmm_trust_threshold: usize,
    /// Interval count at which the HMM verdict stands on its own.
    pub hmm_confidence_threshold: usize,
    /// Modified z-score magnitude beyond which MAD flags a burst.
    pub mad_z_threshold: f64,
    /// Number of shuffles in the permutation test.
    pub permutation_n: usize,
    /// Significance level for the permutation test.
    pub permutation_alpha: f64,
    /// Fixed RNG seed for the permutation test; `None` draws from entropy.
    pub permutation_seed: Option<u64>,
    /// Raw batches longer than this many lines are split into equal-sized
    /// sub-batches, each emitting its own AnalysisResult.
    pub batch_size: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Warning,
            history_ttl_hours: 48,
            hmm_trust_threshold: 20,
            hmm_confidence_threshold: 40,
            mad_z_threshold: 3.5,
            permutation_n: 1000,
            permutation_alpha: 0.05,
            permutation_seed: None,
            batch_size: 10_000,
        }
    }
}

impl AnalyzerConfig {
    /// Build a config from the environment. A variable that is present but
    /// unparsable is a fatal configuration error, not a silent default.
    pub fn from_env() -> Result<Self, VigilError> {
        let mut config = Self::default();

        if let Some(raw) = read_var("VIGIL_MIN_SEVERITY") {
            config.min_severity = raw
                .parse()
                .map_err(|e: String| VigilError::Config(e))?;
        }
        if let Some(raw) = read_var("VIGIL_HISTORY_TTL_HOURS") {
            config.history_ttl_hours = parse_var("VIGIL_HISTORY_TTL_HOURS", &raw)?;
        }
        if let Some(raw) = read_var("VIGIL_HMM_TRUST_THRESHOLD") {
            config.hmm_trust_threshold = parse_var("VIGIL_HMM_TRUST_THRESHOLD", &raw)?;
        }
        if let Some(raw) = read_var("VIGIL_HMM_CONFIDENCE_THRESHOLD") {
            config.hmm_confidence_threshold = parse_var("VIGIL_HMM_CONFIDENCE_THRESHOLD", &raw)?;
        }
        if let Some(raw) = read_var("VIGIL_MAD_Z_THRESHOLD") {
            config.mad_z_threshold = parse_var("VIGIL_MAD_Z_THRESHOLD", &raw)?;
        }
        if let Some(raw) = read_var("VIGIL_PERMUTATION_N") {
            config.permutation_n = parse_var("VIGIL_PERMUTATION_N", &raw)?;
        }
        if let Some(raw) = read_var("VIGIL_PERMUTATION_ALPHA") {
            config.permutation_alpha = parse_var("VIGIL_PERMUTATION_ALPHA", &raw)?;
        }
        if let Some(raw) = read_var("VIGIL_PERMUTATION_SEED") {
            config.permutation_seed = Some(parse_var("VIGIL_PERMUTATION_SEED", &raw)?);
        }
        if let Some(raw) = read_var("VIGIL_BATCH_SIZE") {
            config.batch_size = parse_var("VIGIL_BATCH_SIZE", &raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VigilError> {
        if self.hmm_trust_threshold >= self.hmm_confidence_threshold {
            return Err(VigilError::Config(format!(
                "hmm_trust_threshold ({}) must be below hmm_confidence_threshold ({})",
                self.hmm_trust_threshold, self.hmm_confidence_threshold
            )));
        }
        if self.history_ttl_hours <= 0 {
            return Err(VigilError::Config(
                "history_ttl_hours must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.permutation_alpha) || self.permutation_alpha == 0.0 {
            return Err(VigilError::Config(format!(
                "permutation_alpha must be in (0, 1), got {}",
                self.permutation_alpha
            )));
        }
        if self.permutation_n == 0 {
            return Err(VigilError::Config(
                "permutation_n must be positive".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(VigilError::Config("batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

fn read_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, VigilError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| VigilError::Config(format!("{}={:?}: {}", name, raw, e)))
}
