use crate::aggregator::Aggregator;
use crate::clusterer::Clusterer;
use crate::config::AnalyzerConfig;
use crate::error::VigilError;
use crate::filter::AlertFilter;
use crate::history::{HistoryStore, DEFAULT_HISTORY_LIMIT};
use crate::model::{AlertCluster, AlertDecision, AnalysisResult, Cluster, Digest};
use crate::sink::AlertSink;
use crate::source::{decode_lines, RawLogSource};
use crate::summarizer::{summarize_or_fallback, Summarizer};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Collaborators threaded through the pipeline. Constructed once at
/// startup so every component stays unit-testable with in-memory fakes.
#[derive(Clone)]
pub struct Dependencies {
    pub source: Arc<dyn RawLogSource>,
    pub history: Arc<dyn HistoryStore>,
    pub summarizer: Arc<dyn Summarizer>,
    pub sink: Arc<dyn AlertSink>,
}

/// The per-batch pipeline: fetch, cluster, filter against history,
/// summarize, persist, publish.
pub struct Analyzer {
    config: AnalyzerConfig,
    deps: Dependencies,
    clusterer: Clusterer,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig, deps: Dependencies) -> Result<Self, VigilError> {
        config.validate()?;
        let clusterer = Clusterer::new(config.min_severity);
        Ok(Self {
            config,
            deps,
            clusterer,
        })
    }

    /// Fetch one batch from the source and run it through the pipeline.
    /// Oversized batches are split into equal-sized sub-batches, each
    /// published as its own AnalysisResult.
    pub async fn run_batch(&self) -> Result<Vec<AnalysisResult>, VigilError> {
        self.run_batch_with_deadline(None).await
    }

    /// As [`run_batch`], but skips statistical evaluation for signatures
    /// not reached before `deadline`; those default to no-alert.
    pub async fn run_batch_with_deadline(
        &self,
        deadline: Option<Instant>,
    ) -> Result<Vec<AnalysisResult>, VigilError> {
        let batch = self.deps.source.fetch_batch().await?;
        let lines = decode_lines(&batch)?;
        info!(key = %batch.key, lines = lines.len(), "processing batch");

        let mut results = Vec::new();
        for chunk in split_batch(&lines, self.config.batch_size) {
            let result = self.analyze_lines(chunk, deadline).await?;
            self.deps.sink.publish(&result).await?;
            results.push(result);
        }
        Ok(results)
    }

    /// Run one sub-batch of raw lines through clustering, filtering and
    /// summarization. Does not publish.
    pub async fn analyze_lines(
        &self,
        lines: &[String],
        deadline: Option<Instant>,
    ) -> Result<AnalysisResult, VigilError> {
        let clusters = self
            .clusterer
            .cluster_lines(lines.iter().map(String::as_str));
        debug!(
            lines = lines.len(),
            clusters = clusters.len(),
            "clustering complete"
        );

        let actionable = self.filter_against_history(&clusters, deadline).await;
        let summary = summarize_or_fallback(self.deps.summarizer.as_ref(), &actionable).await;

        // Persist current timestamps for the next run. Failure here must
        // not block publishing; duplicates are idempotent downstream.
        let items: Vec<(String, DateTime<Utc>)> = clusters
            .iter()
            .flat_map(|c| c.timestamps.iter().map(|ts| (c.signature.clone(), *ts)))
            .collect();
        if let Err(e) = self.deps.history.append_batch(&items).await {
            warn!("history write failed: {}", e);
        }

        Ok(AnalysisResult {
            analysis_id: Uuid::new_v4().to_string(),
            summary,
            total_clusters_found: actionable.len(),
            clusters: actionable,
            total_logs_processed: lines.len(),
            processed_at: Utc::now(),
        })
    }

    /// Merge previously published results into one digest and publish it,
    /// unless nothing actionable remains.
    pub async fn aggregate_and_publish(
        &self,
        records: &[serde_json::Value],
    ) -> Result<Digest, VigilError> {
        let digest = Aggregator::new()
            .merge(records, self.deps.summarizer.as_ref())
            .await;
        if digest.clusters.is_empty() {
            info!("no actionable clusters after aggregation, nothing to forward");
            return Ok(digest);
        }
        self.deps.sink.publish(&digest).await?;
        Ok(digest)
    }

    /// Evaluate every cluster against its history window and keep the ones
    /// that fire, ordered by `level_rank × count` descending.
    async fn filter_against_history(
        &self,
        clusters: &[Cluster],
        deadline: Option<Instant>,
    ) -> Vec<AlertCluster> {
        if clusters.is_empty() {
            return Vec::new();
        }

        let signatures: HashSet<String> =
            clusters.iter().map(|c| c.signature.clone()).collect();
        // One batched read covers every signature; a failed read degrades
        // to empty history and the first-event heuristic takes over.
        let history = match self
            .deps
            .history
            .get_recent(&signatures, DEFAULT_HISTORY_LIMIT)
            .await
        {
            Ok(history) => history,
            Err(e) => {
                warn!("history read failed, treating as empty: {}", e);
                Default::default()
            }
        };

        let work: Vec<(Cluster, Vec<DateTime<Utc>>)> = clusters
            .iter()
            .map(|c| {
                let past = history.get(&c.signature).cloned().unwrap_or_default();
                (c.clone(), past)
            })
            .collect();

        let config = self.config.clone();
        let evaluated = tokio::task::spawn_blocking(move || {
            evaluate_clusters(&config, work, deadline)
        })
        .await
        .unwrap_or_else(|e| {
            warn!("filter worker pool panicked: {}", e);
            Vec::new()
        });

        let mut actionable: Vec<AlertCluster> = evaluated
            .iter()
            .filter(|(_, decision)| decision.alert)
            .map(|(cluster, decision)| {
                info!(
                    signature = %cluster.signature,
                    reason = %decision.reason,
                    count = cluster.count,
                    "alerting"
                );
                AlertCluster::from(cluster)
            })
            .collect();
        actionable.sort_by_key(|c| std::cmp::Reverse(c.level_rank as usize * c.count));
        actionable
    }
}

/// Per-signature filtering is embarrassingly parallel and CPU-bound: a
/// bounded pool of workers pulls clusters off a shared cursor. Signatures
/// not reached before the deadline default to no-alert.
fn evaluate_clusters(
    config: &AnalyzerConfig,
    work: Vec<(Cluster, Vec<DateTime<Utc>>)>,
    deadline: Option<Instant>,
) -> Vec<(Cluster, AlertDecision)> {
    let workers = num_cpus::get().min(8).min(work.len()).max(1);
    let cursor = AtomicUsize::new(0);
    let work = &work;
    let cursor = &cursor;

    let mut indexed: Vec<(usize, AlertDecision)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(move || {
                    let filter = AlertFilter::new(config);
                    let mut out = Vec::new();
                    loop {
                        let index = cursor.fetch_add(1, Ordering::Relaxed);
                        if index >= work.len() {
                            break;
                        }
                        let (cluster, past) = &work[index];
                        let decision = if deadline.is_some_and(|d| Instant::now() >= d) {
                            AlertDecision::suppress("deadline exceeded, not evaluated")
                        } else {
                            filter.evaluate(past, &cluster.timestamps)
                        };
                        out.push((index, decision));
                    }
                    out
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().expect("filter worker panicked"))
            .collect()
    });

    indexed.sort_by_key(|(index, _)| *index);
    work.iter()
        .map(|(cluster, _)| cluster.clone())
        .zip(indexed.into_iter().map(|(_, decision)| decision))
        .collect()
}

/// Split `lines` into the fewest equal-sized chunks no longer than
/// `batch_size`. An empty batch still yields one (empty) chunk so that an
/// empty AnalysisResult is emitted.
fn split_batch(lines: &[String], batch_size: usize) -> Vec<&[String]> {
    if lines.is_empty() {
        return vec![&[]];
    }
    if lines.len() <= batch_size {
        return vec![lines];
    }
    let num_chunks = lines.len().div_ceil(batch_size);
    let chunk_size = lines.len().div_ceil(num_chunks);
    lines.chunks(chunk_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn lines(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("[ERROR] failure {}", i)).collect()
    }

    #[test]
    fn test_split_small_batch_is_whole() {
        let input = lines(10);
        let chunks = split_batch(&input, 100);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 10);
    }

    #[test]
    fn test_split_oversized_batch_equal_chunks() {
        let input = lines(25);
        let chunks = split_batch(&input, 10);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 9);
        assert_eq!(chunks[1].len(), 9);
        assert_eq!(chunks[2].len(), 7);
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, 25);
        assert!(chunks.iter().all(|c| c.len() <= 10));
    }

    #[test]
    fn test_split_empty_batch_yields_one_chunk() {
        let chunks = split_batch(&[], 10);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }

    #[test]
    fn test_evaluate_clusters_preserves_input_order() {
        let config = AnalyzerConfig::default();
        let base = Utc::now() - Duration::hours(1);
        let work: Vec<(Cluster, Vec<DateTime<Utc>>)> = (0..10)
            .map(|i| {
                (
                    Cluster {
                        signature: format!("ERROR: kind {}", i),
                        count: 1,
                        level_rank: 3,
                        representative_log: format!("[ERROR] kind {}", i),
                        timestamps: vec![base + Duration::minutes(i)],
                    },
                    Vec::new(),
                )
            })
            .collect();

        let evaluated = evaluate_clusters(&config, work, None);
        assert_eq!(evaluated.len(), 10);
        for (i, (cluster, decision)) in evaluated.iter().enumerate() {
            assert_eq!(cluster.signature, format!("ERROR: kind {}", i));
            // No history at all: every signature is a first event.
            assert!(decision.alert);
            assert_eq!(decision.reason, "first event sequence");
        }
    }

    #[test]
    fn test_expired_deadline_defaults_to_no_alert() {
        let config = AnalyzerConfig::default();
        let work = vec![(
            Cluster {
                signature: "ERROR: late".to_string(),
                count: 1,
                level_rank: 3,
                representative_log: "[ERROR] late".to_string(),
                timestamps: vec![Utc::now()],
            },
            Vec::new(),
        )];

        let past_deadline = Instant::now() - std::time::Duration::from_millis(1);
        let evaluated = evaluate_clusters(&config, work, Some(past_deadline));
        assert_eq!(evaluated.len(), 1);
        assert!(!evaluated[0].1.alert);
    }
}
