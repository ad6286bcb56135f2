//! Reading the tool's output document.

use std::path::Path;

use async_trait::async_trait;
use logrelay_core::CoreError;
use serde_json::Value;

/// Loads a (possibly gzipped) JSON document from disk.
///
/// The worker pool implements this so large outputs are decoded off the
/// async runtime; [`InlineReader`] is the standalone fallback.
#[async_trait]
pub trait DocumentReader: Send + Sync {
    async fn read_document(&self, path: &Path, is_gzipped: bool) -> Result<Value, CoreError>;
}

/// Decodes on tokio's blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineReader;

#[async_trait]
impl DocumentReader for InlineReader {
    async fn read_document(&self, path: &Path, is_gzipped: bool) -> Result<Value, CoreError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || logrelay_core::parse_document(&path, is_gzipped))
            .await
            .map_err(|e| CoreError::InvalidInput(format!("reader task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inline_reader_plain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        std::fs::write(&path, r#"{"fightName":"Sabetha"}"#).unwrap();

        let value = InlineReader.read_document(&path, false).await.unwrap();
        assert_eq!(value["fightName"], "Sabetha");
    }

    #[tokio::test]
    async fn test_inline_reader_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = InlineReader
            .read_document(&dir.path().join("nope.json"), false)
            .await;
        assert!(matches!(result, Err(CoreError::Io { .. })));
    }
}
