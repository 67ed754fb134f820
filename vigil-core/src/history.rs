use crate::error::VigilError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

/// Default cap on how many timestamps are read back per signature.
pub const DEFAULT_HISTORY_LIMIT: usize = 10_000;

/// Rolling per-signature event history.
///
/// The store is append-only with a write-time TTL; reads return the newest
/// `limit` timestamps per signature in chronological order. Read-then-write
/// is not transactional: concurrent writers may duplicate timestamps, which
/// downstream consumers tolerate.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn get_recent(
        &self,
        signatures: &HashSet<String>,
        limit_per_signature: usize,
    ) -> Result<HashMap<String, Vec<DateTime<Utc>>>, VigilError>;

    async fn append_batch(&self, items: &[(String, DateTime<Utc>)]) -> Result<(), VigilError>;
}

struct HistoryRecord {
    timestamp: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// In-process history store keyed on `(signature, timestamp)`, used by the
/// CLI and tests. Expired records are pruned lazily on read.
pub struct InMemoryHistoryStore {
    records: Mutex<HashMap<String, Vec<HistoryRecord>>>,
    ttl: Duration,
}

impl InMemoryHistoryStore {
    pub fn new(ttl_hours: i64) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            ttl: Duration::hours(ttl_hours),
        }
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn get_recent(
        &self,
        signatures: &HashSet<String>,
        limit_per_signature: usize,
    ) -> Result<HashMap<String, Vec<DateTime<Utc>>>, VigilError> {
        let now = Utc::now();
        let mut records = self.records.lock().await;
        let mut out = HashMap::new();

        for signature in signatures {
            let Some(entries) = records.get_mut(signature) else {
                continue;
            };
            entries.retain(|r| r.expires_at > now);

            let mut timestamps: Vec<DateTime<Utc>> =
                entries.iter().map(|r| r.timestamp).collect();
            timestamps.sort();
            // Newest `limit` entries, still oldest-first.
            if timestamps.len() > limit_per_signature {
                timestamps.drain(..timestamps.len() - limit_per_signature);
            }
            if !timestamps.is_empty() {
                out.insert(signature.clone(), timestamps);
            }
        }

        debug!(
            requested = signatures.len(),
            found = out.len(),
            "history read"
        );
        Ok(out)
    }

    async fn append_batch(&self, items: &[(String, DateTime<Utc>)]) -> Result<(), VigilError> {
        if items.is_empty() {
            return Ok(());
        }
        let expires_at = Utc::now() + self.ttl;
        let mut records = self.records.lock().await;
        for (signature, timestamp) in items {
            records
                .entry(signature.clone())
                .or_default()
                .push(HistoryRecord {
                    timestamp: *timestamp,
                    expires_at,
                });
        }
        debug!(items = items.len(), "history write");
        Ok(())
    }
}
