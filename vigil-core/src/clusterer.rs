use crate::model::{Cluster, LogEvent, Severity};
use crate::parser::LogParser;
use std::collections::HashMap;

/// Groups raw log lines into clusters keyed by signature.
///
/// Stateless per call: each batch starts from an empty map. Within a
/// cluster, timestamps keep the order events appeared in the batch; across
/// clusters, output is sorted by count descending with ties preserving
/// first-seen order.
pub struct Clusterer {
    parser: LogParser,
}

impl Clusterer {
    pub fn new(min_severity: Severity) -> Self {
        Self {
            parser: LogParser::new(min_severity),
        }
    }

    pub fn cluster_lines<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = Vec::new();
        let mut index_by_signature: HashMap<String, usize> = HashMap::new();

        for line in lines {
            let Some(event) = self.parser.parse_line(line) else {
                continue;
            };
            self.fold_event(&mut clusters, &mut index_by_signature, event);
        }

        // Stable sort keeps first-seen order among equal counts.
        clusters.sort_by(|a, b| b.count.cmp(&a.count));
        clusters
    }

    fn fold_event(
        &self,
        clusters: &mut Vec<Cluster>,
        index_by_signature: &mut HashMap<String, usize>,
        event: LogEvent,
    ) {
        match index_by_signature.get(&event.signature) {
            Some(&index) => {
                let cluster = &mut clusters[index];
                cluster.count += 1;
                cluster.timestamps.push(event.timestamp);
            }
            None => {
                index_by_signature.insert(event.signature.clone(), clusters.len());
                clusters.push(Cluster {
                    signature: event.signature,
                    count: 1,
                    level_rank: event.level_rank,
                    representative_log: event.raw,
                    timestamps: vec![event.timestamp],
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusterer() -> Clusterer {
        Clusterer::new(Severity::Warning)
    }

    #[test]
    fn test_clusters_by_signature_sorted_by_count() {
        let lines = vec![
            r#"[2025-06-25T02:37:12Z][CRITICAL]: NullPointerException in user_authentication.py Details: {"line": 152}"#,
            r#"[2025-06-25T02:37:13Z][CRITICAL]: NullPointerException in user_authentication.py Details: {"line": 998}"#,
            "[2025-06-25T02:37:14Z][WARNING]: Disk low",
        ];
        let clusters = clusterer().cluster_lines(lines);

        assert_eq!(clusters.len(), 2);
        assert_eq!(
            clusters[0].signature,
            "CRITICAL: NullPointerException in user_authentication.py"
        );
        assert_eq!(clusters[0].count, 2);
        assert_eq!(clusters[0].level_rank, 4);
        assert_eq!(clusters[1].signature, "WARNING: Disk low");
        assert_eq!(clusters[1].count, 1);
    }

    #[test]
    fn test_representative_is_first_raw_line() {
        let lines = vec![
            "[ERROR] Timeout after 100ms for request 5",
            "[ERROR] Timeout after 900ms for request 77",
        ];
        let clusters = clusterer().cluster_lines(lines);
        assert_eq!(clusters.len(), 1);
        assert_eq!(
            clusters[0].representative_log,
            "[ERROR] Timeout after 100ms for request 5"
        );
        assert_eq!(clusters[0].count, 2);
    }

    #[test]
    fn test_count_matches_timestamps() {
        let lines = vec![
            "[2025-06-25T01:00:00Z] [ERROR] queue stalled",
            "[2025-06-25T02:00:00Z] [ERROR] queue stalled",
            "[2025-06-25T03:00:00Z] [ERROR] queue stalled",
            "[2025-06-25T03:30:00Z] [WARNING] queue depth 900",
        ];
        let clusters = clusterer().cluster_lines(lines);
        let total: usize = clusters.iter().map(|c| c.count).sum();
        assert_eq!(total, 4);
        for cluster in &clusters {
            assert_eq!(cluster.count, cluster.timestamps.len());
            let mut sorted = cluster.timestamps.clone();
            sorted.sort();
            assert_eq!(sorted, cluster.timestamps, "batch order preserved");
        }
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let lines = vec![
            "[ERROR] first failure kind",
            "[WARNING] second failure kind",
        ];
        let clusters = clusterer().cluster_lines(lines);
        assert_eq!(clusters[0].signature, "ERROR: first failure kind");
        assert_eq!(clusters[1].signature, "WARNING: second failure kind");
    }

    #[test]
    fn test_empty_batch() {
        let clusters = clusterer().cluster_lines(Vec::<&str>::new());
        assert!(clusters.is_empty());
    }

    #[test]
    fn test_unparsable_lines_skipped() {
        let lines = vec!["", "   ", "[INFO] below the floor", "[ERROR] kept"];
        let clusters = clusterer().cluster_lines(lines);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].signature, "ERROR: kept");
    }
}
