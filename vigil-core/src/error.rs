use thiserror::Error;

/// Error taxonomy for the analysis pipeline.
///
/// Recoverable kinds (history reads/writes, summarization) are handled close
/// to where they occur; anything that would silently under-count or
/// mis-attribute events is surfaced to the caller.
#[derive(Error, Debug)]
pub enum VigilError {
    #[error("failed to fetch raw logs: {0}")]
    UpstreamFetch(String),

    #[error("history read failed: {0}")]
    HistoryRead(String),

    #[error("history write failed: {0}")]
    HistoryWrite(String),

    #[error("summarizer failed: {0}")]
    Summarizer(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VigilError>;
