use crate::model::{AlertCluster, Digest};
use crate::summarizer::Summarizer;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Separator used when per-batch summaries are concatenated because the
/// summarizer could not synthesize them.
const SUMMARY_SEPARATOR: &str = "\n\n---\n\n";

/// Folds several per-batch analysis results into one consolidated digest.
///
/// Records are accepted as loose JSON so a malformed producer cannot fail
/// the whole digest; anything undecodable is skipped with a warning.
#[derive(Debug, Default)]
pub struct Aggregator;

impl Aggregator {
    pub fn new() -> Self {
        Self
    }

    pub async fn merge(&self, records: &[Value], summarizer: &dyn Summarizer) -> Digest {
        let mut clusters: Vec<AlertCluster> = Vec::new();
        let mut index_by_signature: HashMap<String, usize> = HashMap::new();
        let mut total_logs: usize = 0;
        let mut summaries: Vec<String> = Vec::new();
        let mut analysis_id = String::from("consolidated-digest");

        debug!(records = records.len(), "aggregating analysis results");

        for record in records {
            let Some(result) = unwrap_envelope(record) else {
                warn!("skipping record that could not be decoded");
                continue;
            };

            if let Some(total) = result.get("total_logs_processed").and_then(Value::as_u64) {
                total_logs += total as usize;
            }
            if let Some(id) = result.get("analysis_id").and_then(Value::as_str) {
                analysis_id.push_str(id);
            }
            if let Some(summary) = result.get("summary").and_then(Value::as_str) {
                if !summary.is_empty() {
                    summaries.push(summary.to_string());
                }
            }

            for raw_cluster in result
                .get("clusters")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default()
            {
                let Ok(cluster) = serde_json::from_value::<AlertCluster>(raw_cluster.clone())
                else {
                    warn!("skipping malformed cluster record");
                    continue;
                };
                if cluster.signature.is_empty() {
                    continue;
                }
                match index_by_signature.get(&cluster.signature) {
                    Some(&index) => clusters[index].count += cluster.count,
                    None => {
                        index_by_signature.insert(cluster.signature.clone(), clusters.len());
                        clusters.push(cluster);
                    }
                }
            }
        }

        clusters.sort_by(|a, b| b.count.cmp(&a.count));

        let summary = if summaries.is_empty() {
            String::new()
        } else {
            match summarizer.synthesize(&summaries).await {
                Ok(synthesized) => synthesized,
                Err(e) => {
                    warn!("could not synthesize digest summary: {}", e);
                    summaries.join(SUMMARY_SEPARATOR)
                }
            }
        };

        Digest {
            analysis_id,
            summary,
            total_clusters_found: clusters.len(),
            clusters,
            total_logs_processed: total_logs,
            processed_at: Utc::now(),
        }
    }
}

/// Strip a transport envelope: a top-level `Message` key holding the actual
/// result as an embedded JSON string (or object). Plain results pass
/// through untouched.
fn unwrap_envelope(record: &Value) -> Option<Value> {
    if !record.is_object() {
        return None;
    }
    match record.get("Message") {
        Some(Value::String(embedded)) => serde_json::from_str(embedded).ok(),
        Some(inner @ Value::Object(_)) => Some(inner.clone()),
        Some(_) => None,
        None => Some(record.clone()),
    }
}
