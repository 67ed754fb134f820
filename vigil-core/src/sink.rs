use crate::error::VigilError;
use crate::model::AnalysisResult;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Downstream consumer of analysis results and digests.
///
/// `publish` is all-or-nothing per invocation; a failure surfaces to the
/// caller so the transport can retry without the core losing counts.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn publish(&self, result: &AnalysisResult) -> Result<(), VigilError>;
}

/// Writes results as JSON to stdout. The CLI's default sink.
#[derive(Debug, Default)]
pub struct StdoutSink {
    pub pretty: bool,
}

impl StdoutSink {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

#[async_trait]
impl AlertSink for StdoutSink {
    async fn publish(&self, result: &AnalysisResult) -> Result<(), VigilError> {
        let payload = if self.pretty {
            serde_json::to_string_pretty(result)
        } else {
            serde_json::to_string(result)
        }
        .map_err(|e| VigilError::Publish(e.to_string()))?;
        println!("{}", payload);
        Ok(())
    }
}

/// Collects published results in memory; the test seam.
#[derive(Debug, Default)]
pub struct MemorySink {
    published: Mutex<Vec<AnalysisResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn published(&self) -> Vec<AnalysisResult> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl AlertSink for MemorySink {
    async fn publish(&self, result: &AnalysisResult) -> Result<(), VigilError> {
        self.published.lock().await.push(result.clone());
        Ok(())
    }
}
