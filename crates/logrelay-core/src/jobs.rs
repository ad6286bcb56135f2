//! CPU-bound job implementations.
//!
//! These run either inside a pool worker or inline on the fallback path.
//! There is exactly one implementation of each so the two paths cannot
//! drift apart.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::CoreError;

const HASH_CHUNK: usize = 64 * 1024;

/// Compute the lowercase hex SHA-256 digest of a file, streaming its contents.
pub fn hash_file(path: &Path) -> Result<String, CoreError> {
    let file = File::open(path).map_err(|e| CoreError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK];

    loop {
        let read = reader.read(&mut buf).map_err(|e| CoreError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Read a JSON document from disk, inflating it first when gzip-compressed.
pub fn parse_document(path: &Path, is_gzipped: bool) -> Result<Value, CoreError> {
    let raw = std::fs::read(path).map_err(|e| CoreError::io(path, e))?;
    if !is_gzipped {
        return parse_json_bytes(&raw);
    }

    let mut inflated = Vec::with_capacity(raw.len() * 4);
    GzDecoder::new(raw.as_slice())
        .read_to_end(&mut inflated)
        .map_err(|source| CoreError::Decompress {
            path: path.display().to_string(),
            source,
        })?;
    parse_json_bytes(&inflated)
}

/// Parse UTF-8 JSON bytes.
pub fn parse_json_bytes(bytes: &[u8]) -> Result<Value, CoreError> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Returns true if the path looks gzip-compressed by extension.
pub fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_hash_file_matches_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.zevtc");
        std::fs::write(&path, b"abc").unwrap();

        let digest = hash_file(&path).unwrap();
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hash_missing_file_is_io_error() {
        let err = hash_file(Path::new("/definitely/not/here.zevtc")).unwrap_err();
        assert!(matches!(err, CoreError::Io { .. }));
    }

    #[test]
    fn test_parse_plain_and_gzipped_documents() {
        let dir = tempfile::tempdir().unwrap();
        let doc = json!({"players": [{"name": "A"}], "duration": "1m"});

        let plain = dir.path().join("fight.json");
        std::fs::write(&plain, serde_json::to_vec(&doc).unwrap()).unwrap();
        assert_eq!(parse_document(&plain, false).unwrap(), doc);

        let gz = dir.path().join("fight.json.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serde_json::to_vec(&doc).unwrap()).unwrap();
        std::fs::write(&gz, encoder.finish().unwrap()).unwrap();
        assert!(is_gzip_path(&gz));
        assert_eq!(parse_document(&gz, true).unwrap(), doc);
    }

    #[test]
    fn test_parse_rejects_non_gzip_data_flagged_as_gzip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.json.gz");
        std::fs::write(&path, b"{}").unwrap();
        assert!(matches!(
            parse_document(&path, true),
            Err(CoreError::Decompress { .. })
        ));
    }
}
