use crate::error::VigilError;
use async_trait::async_trait;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::PathBuf;
use tracing::warn;

/// One fetched payload of raw log bytes, identified by its source key.
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub key: String,
    pub bytes: Vec<u8>,
}

/// Upstream provider of raw log payloads. Keys ending in `.gz` mark
/// gzip-compressed payloads and are decompressed transparently downstream.
#[async_trait]
pub trait RawLogSource: Send + Sync {
    async fn fetch_batch(&self) -> Result<RawBatch, VigilError>;
}

/// Reads one log file from disk; the file name is the batch key.
pub struct FileLogSource {
    path: PathBuf,
}

impl FileLogSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RawLogSource for FileLogSource {
    async fn fetch_batch(&self) -> Result<RawBatch, VigilError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| VigilError::UpstreamFetch(format!("{}: {}", self.path.display(), e)))?;
        Ok(RawBatch {
            key: self.path.to_string_lossy().into_owned(),
            bytes,
        })
    }
}

/// A fixed in-memory payload, for tests and programmatic use.
pub struct StaticLogSource {
    batch: RawBatch,
}

impl StaticLogSource {
    pub fn new(key: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            batch: RawBatch {
                key: key.into(),
                bytes: bytes.into(),
            },
        }
    }
}

#[async_trait]
impl RawLogSource for StaticLogSource {
    async fn fetch_batch(&self) -> Result<RawBatch, VigilError> {
        Ok(self.batch.clone())
    }
}

/// Turn a raw payload into log lines: gunzip when the key says so,
/// normalize double newlines, split, and skip lines that are not UTF-8.
pub fn decode_lines(batch: &RawBatch) -> Result<Vec<String>, VigilError> {
    let bytes = if batch.key.ends_with(".gz") {
        let mut decoder = GzDecoder::new(batch.bytes.as_slice());
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .map_err(|e| VigilError::UpstreamFetch(format!("gzip decode of {}: {}", batch.key, e)))?;
        decompressed
    } else {
        batch.bytes.clone()
    };

    let mut lines = Vec::new();
    let mut skipped = 0usize;
    for raw_line in bytes.split(|&b| b == b'\n') {
        if raw_line.is_empty() {
            // Collapses double newlines and drops the trailing one.
            continue;
        }
        match std::str::from_utf8(raw_line) {
            Ok(line) => lines.push(line.trim_end_matches('\r').to_string()),
            Err(_) => skipped += 1,
        }
    }
    if skipped > 0 {
        warn!(skipped, key = %batch.key, "skipped non-UTF-8 log lines");
    }
    Ok(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[test]
    fn test_decode_plain_lines() {
        let batch = RawBatch {
            key: "batch.txt".to_string(),
            bytes: b"[ERROR] one\n[ERROR] two\n".to_vec(),
        };
        let lines = decode_lines(&batch).unwrap();
        assert_eq!(lines, vec!["[ERROR] one", "[ERROR] two"]);
    }

    #[test]
    fn test_double_newlines_collapsed() {
        let batch = RawBatch {
            key: "batch.txt".to_string(),
            bytes: b"[ERROR] one\n\n[ERROR] two\n\n\n[ERROR] three".to_vec(),
        };
        let lines = decode_lines(&batch).unwrap();
        assert_eq!(lines.len(), 3);
    }

    #[test]
    fn test_gzip_payload_decompressed() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"[ERROR] compressed line\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let batch = RawBatch {
            key: "logs/2025/06/25/batch-01.log.gz".to_string(),
            bytes: compressed,
        };
        let lines = decode_lines(&batch).unwrap();
        assert_eq!(lines, vec!["[ERROR] compressed line"]);
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let batch = RawBatch {
            key: "bad.gz".to_string(),
            bytes: b"definitely not gzip".to_vec(),
        };
        assert!(decode_lines(&batch).is_err());
    }

    #[test]
    fn test_invalid_utf8_lines_skipped() {
        let mut bytes = b"[ERROR] good line\n".to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe, 0xfd]);
        bytes.extend_from_slice(b"\n[ERROR] another good line\n");
        let batch = RawBatch {
            key: "batch.txt".to_string(),
            bytes,
        };
        let lines = decode_lines(&batch).unwrap();
        assert_eq!(lines, vec!["[ERROR] good line", "[ERROR] another good line"]);
    }

    #[tokio::test]
    async fn test_file_source_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "[ERROR] from disk\n").unwrap();

        let source = FileLogSource::new(&path);
        let batch = source.fetch_batch().await.unwrap();
        let lines = decode_lines(&batch).unwrap();
        assert_eq!(lines, vec!["[ERROR] from disk"]);
    }

    #[tokio::test]
    async fn test_missing_file_surfaces_fetch_error() {
        let source = FileLogSource::new("/definitely/not/here.log");
        assert!(matches!(
            source.fetch_batch().await,
            Err(VigilError::UpstreamFetch(_))
        ));
    }
}
