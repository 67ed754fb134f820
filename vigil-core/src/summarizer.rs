use crate::error::VigilError;
use crate::model::AlertCluster;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

/// Natural-language summarization of cluster digests. Implementations may
/// fail; callers fall back to [`fallback_summary`].
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// One batch's actionable clusters into a short prose summary.
    async fn summarize(&self, clusters: &[AlertCluster]) -> Result<String, VigilError>;

    /// Several per-batch summaries into a single digest summary.
    async fn synthesize(&self, summaries: &[String]) -> Result<String, VigilError>;
}

/// Deterministic summary used whenever the LLM is unavailable or fails.
pub fn fallback_summary(clusters: &[AlertCluster]) -> String {
    if clusters.is_empty() {
        return "No errors detected.".to_string();
    }
    let total: usize = clusters.iter().map(|c| c.count).sum();
    let most_common = clusters
        .iter()
        .max_by_key(|c| c.count)
        .expect("non-empty clusters");
    format!(
        "Found {} errors across {} unique signatures. Most common ({}×): '{}'.",
        total,
        clusters.len(),
        most_common.count,
        most_common.signature
    )
}

/// A summarizer that always fails, forcing the deterministic fallback.
/// Useful for offline runs and tests.
#[derive(Debug, Default)]
pub struct NoopSummarizer;

#[async_trait]
impl Summarizer for NoopSummarizer {
    async fn summarize(&self, _clusters: &[AlertCluster]) -> Result<String, VigilError> {
        Err(VigilError::Summarizer("no summarizer configured".into()))
    }

    async fn synthesize(&self, _summaries: &[String]) -> Result<String, VigilError> {
        Err(VigilError::Summarizer("no summarizer configured".into()))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    content: Vec<ChatContent>,
}

#[derive(Debug, Deserialize)]
struct ChatContent {
    text: String,
}

/// LLM-backed summarizer speaking the Anthropic messages API.
pub struct HttpSummarizer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl HttpSummarizer {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            endpoint: "https://api.anthropic.com/v1/messages".to_string(),
            api_key,
            model: "claude-3-haiku-20240307".to_string(),
        }
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    async fn complete(&self, system: &str, user_prompt: String) -> Result<String, VigilError> {
        let request = ChatRequest {
            model: self.model.clone(),
            max_tokens: 300,
            temperature: 0.5,
            system: system.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: user_prompt,
            }],
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(VigilError::Summarizer(format!("HTTP {}: {}", status, body)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| VigilError::Summarizer(format!("unparsable response: {}", e)))?;
        let text = parsed
            .content
            .first()
            .map(|c| c.text.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| VigilError::Summarizer("empty response content".into()))?;
        Ok(text)
    }

    /// Clusters as bullet points, most frequent first.
    fn format_clusters(clusters: &[AlertCluster]) -> String {
        let mut sorted: Vec<&AlertCluster> = clusters.iter().collect();
        sorted.sort_by(|a, b| b.count.cmp(&a.count));
        sorted
            .iter()
            .map(|c| format!("- Signature: \"{}\", Occurrences: {}", c.signature, c.count))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    async fn summarize(&self, clusters: &[AlertCluster]) -> Result<String, VigilError> {
        if clusters.is_empty() {
            return Ok("No log clusters were provided for summarization.".to_string());
        }
        let prompt = format!(
            "Summarize the following production error clusters in two or three \
             sentences, leading with the most likely root cause:\n{}",
            Self::format_clusters(clusters)
        );
        self.complete(
            "You are an expert systems analyst. Provide a concise, actionable \
             summary of these production error clusters.",
            prompt,
        )
        .await
    }

    async fn synthesize(&self, summaries: &[String]) -> Result<String, VigilError> {
        if summaries.is_empty() {
            return Ok(String::new());
        }
        let prompt = format!(
            "The following are summaries of separate log analysis batches. \
             Synthesize them into one consolidated incident summary:\n\n{}",
            summaries.join("\n\n")
        );
        self.complete(
            "You are an expert systems analyst. Merge partial incident reports \
             into a single coherent digest.",
            prompt,
        )
        .await
    }
}

/// Summarize with fallback: never fails, always yields usable text.
pub async fn summarize_or_fallback(
    summarizer: &dyn Summarizer,
    clusters: &[AlertCluster],
) -> String {
    match summarizer.summarize(clusters).await {
        Ok(summary) => summary,
        Err(e) => {
            warn!("summarizer failed, using deterministic fallback: {}", e);
            fallback_summary(clusters)
        }
    }
}
