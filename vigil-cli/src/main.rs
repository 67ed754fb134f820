// Vigil CLI - run one batch of logs through the analysis pipeline

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use vigil_core::{
    AnalyzerConfig, Analyzer, Dependencies, FileLogSource, HttpSummarizer, InMemoryHistoryStore,
    NoopSummarizer, Severity, StdoutSink, Summarizer,
};

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Cluster a log batch and flag anomalous error bursts", long_about = None)]
#[command(version)]
struct Cli {
    /// Log file to analyze (gzip is detected by a .gz extension)
    file: PathBuf,

    /// Minimum severity to keep (DEBUG, INFO, SERVICE, WARNING, ERROR, CRITICAL)
    #[arg(long)]
    min_severity: Option<Severity>,

    /// Fixed seed for the permutation test, for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Split batches longer than this many lines
    #[arg(long)]
    batch_size: Option<usize>,

    /// Emit compact JSON instead of pretty-printed
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vigil=info".parse().unwrap())
                .add_directive("vigil_core=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let mut config = AnalyzerConfig::from_env()?;
    if let Some(min_severity) = cli.min_severity {
        config.min_severity = min_severity;
    }
    if let Some(seed) = cli.seed {
        config.permutation_seed = Some(seed);
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    config.validate()?;

    // Summaries use the LLM only when a key is configured; otherwise the
    // deterministic fallback keeps the run fully offline.
    let summarizer: Arc<dyn Summarizer> = match std::env::var("ANTHROPIC_API_KEY") {
        Ok(key) if !key.is_empty() => Arc::new(HttpSummarizer::new(key)),
        _ => Arc::new(NoopSummarizer),
    };

    let deps = Dependencies {
        source: Arc::new(FileLogSource::new(&cli.file)),
        history: Arc::new(InMemoryHistoryStore::new(config.history_ttl_hours)),
        summarizer,
        sink: Arc::new(if cli.compact {
            StdoutSink::default()
        } else {
            StdoutSink::pretty()
        }),
    };

    let analyzer = Analyzer::new(config, deps)?;
    info!("analyzing {}", cli.file.display());

    let results = match analyzer.run_batch().await {
        Ok(results) => results,
        Err(e) => {
            error!("analysis failed: {}", e);
            return Err(e.into());
        }
    };

    info!(
        batches = results.len(),
        alerts = results.iter().map(|r| r.clusters.len()).sum::<usize>(),
        "analysis complete"
    );

    // Several sub-batches fold into one consolidated digest.
    if results.len() > 1 {
        let records: Vec<serde_json::Value> = results
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<_, _>>()?;
        analyzer.aggregate_and_publish(&records).await?;
    }

    Ok(())
}
