use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Canonical log severities, ordered by how loudly they should be heard.
///
/// `Info` and `Service` share a rank: service lifecycle chatter is treated
/// as informational for filtering purposes but keeps its own label in
/// signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Debug,
    Service,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Numeric rank used for the minimum-severity floor and alert ordering.
    pub fn rank(&self) -> u8 {
        match self {
            Severity::Critical => 4,
            Severity::Error => 3,
            Severity::Warning => 2,
            Severity::Info | Severity::Service => 1,
            Severity::Debug => 0,
        }
    }

    /// Every recognized level, in descending rank order.
    pub fn all() -> &'static [Severity] {
        &[
            Severity::Critical,
            Severity::Error,
            Severity::Warning,
            Severity::Info,
            Severity::Service,
            Severity::Debug,
        ]
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Debug => write!(f, "DEBUG"),
            Severity::Service => write!(f, "SERVICE"),
            Severity::Info => write!(f, "INFO"),
            Severity::Warning => write!(f, "WARNING"),
            Severity::Error => write!(f, "ERROR"),
            Severity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DEBUG" => Ok(Severity::Debug),
            "SERVICE" => Ok(Severity::Service),
            "INFO" => Ok(Severity::Info),
            "WARNING" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            _ => Err(format!("unrecognized severity: {}", s)),
        }
    }
}

/// One parsed log line. Transient: produced by the parser, folded into a
/// [`Cluster`] by the clusterer, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    pub signature: String,
    pub timestamp: DateTime<Utc>,
    pub level_rank: u8,
    pub raw: String,
}

/// All events in one batch sharing a signature.
///
/// `count == timestamps.len()` always holds; `representative_log` and
/// `level_rank` are fixed by the first event and never change afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cluster {
    pub signature: String,
    pub count: usize,
    pub level_rank: u8,
    pub representative_log: String,
    pub timestamps: Vec<DateTime<Utc>>,
}

/// The stripped cluster payload that survives the alert filter and travels
/// to the sink. Event timestamps stay inside the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlertCluster {
    pub signature: String,
    pub count: usize,
    pub level_rank: u8,
    pub representative_log: String,
}

impl From<&Cluster> for AlertCluster {
    fn from(cluster: &Cluster) -> Self {
        Self {
            signature: cluster.signature.clone(),
            count: cluster.count,
            level_rank: cluster.level_rank,
            representative_log: cluster.representative_log.clone(),
        }
    }
}

/// Outcome of the alert filter for one signature.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertDecision {
    pub alert: bool,
    pub reason: String,
    pub details: HashMap<String, String>,
}

impl AlertDecision {
    pub fn alert(reason: &str) -> Self {
        Self {
            alert: true,
            reason: reason.to_string(),
            details: HashMap::new(),
        }
    }

    pub fn suppress(reason: &str) -> Self {
        Self {
            alert: false,
            reason: reason.to_string(),
            details: HashMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// Result of one batch through clustering and filtering. This is the exact
/// JSON shape published to the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub analysis_id: String,
    pub summary: String,
    pub clusters: Vec<AlertCluster>,
    pub total_logs_processed: usize,
    pub total_clusters_found: usize,
    pub processed_at: DateTime<Utc>,
}

/// A digest is shaped exactly like an [`AnalysisResult`]; only its
/// `analysis_id` convention differs (`consolidated-digest` + merged ids).
pub type Digest = AnalysisResult;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ranks() {
        assert_eq!(Severity::Critical.rank(), 4);
        assert_eq!(Severity::Error.rank(), 3);
        assert_eq!(Severity::Warning.rank(), 2);
        assert_eq!(Severity::Info.rank(), 1);
        assert_eq!(Severity::Service.rank(), 1);
        assert_eq!(Severity::Debug.rank(), 0);
    }

    #[test]
    fn test_severity_round_trip() {
        for level in Severity::all() {
            let parsed: Severity = level.to_string().parse().unwrap();
            assert_eq!(parsed, *level);
        }
        assert!("NOISE".parse::<Severity>().is_err());
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
    }

    #[test]
    fn test_analysis_result_field_names() {
        let result = AnalysisResult {
            analysis_id: "abc".into(),
            summary: "ok".into(),
            clusters: vec![],
            total_logs_processed: 3,
            total_clusters_found: 0,
            processed_at: Utc::now(),
        };
        let json = serde_json::to_value(&result).unwrap();
        for key in [
            "analysis_id",
            "summary",
            "clusters",
            "total_logs_processed",
            "total_clusters_found",
            "processed_at",
        ] {
            assert!(json.get(key).is_some(), "missing field {}", key);
        }
    }
}
