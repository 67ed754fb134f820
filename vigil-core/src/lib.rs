pub mod aggregator;
pub mod clusterer;
pub mod config;
pub mod error;
pub mod filter;
pub mod history;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod summarizer;

pub use aggregator::Aggregator;
pub use clusterer::Clusterer;
pub use config::AnalyzerConfig;
pub use error::VigilError;
pub use filter::{AlertFilter, HmmModel, HmmState, MadModel, PermutationTest};
pub use history::{HistoryStore, InMemoryHistoryStore};
pub use model::{
    AlertCluster, AlertDecision, AnalysisResult, Cluster, Digest, LogEvent, Severity,
};
pub use parser::LogParser;
pub use pipeline::{Analyzer, Dependencies};
pub use sink::{AlertSink, MemorySink, StdoutSink};
pub use source::{FileLogSource, RawBatch, RawLogSource, StaticLogSource};
pub use summarizer::{HttpSummarizer, NoopSummarizer, Summarizer};
