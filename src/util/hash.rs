//! Content hashing for import deduplication.
//!
//! The ledger keys every import attempt by the SHA256 of the raw file bytes,
//! computed before any parsing happens.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::Result;

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Compute the hex SHA256 of a file, streaming it in fixed-size chunks.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];

    loop {
        let read = reader.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Hex SHA256 of an in-memory buffer.
#[must_use]
pub fn bytes_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_hash_matches_bytes_hash() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("export.json");
        fs::write(&path, b"[{\"uuid\":\"c1\"}]").expect("write");

        let from_file = file_hash(&path).expect("hash");
        assert_eq!(from_file, bytes_hash(b"[{\"uuid\":\"c1\"}]"));
        assert_eq!(from_file.len(), 64);
        assert!(from_file.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_file_hash_spans_multiple_chunks() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("big.json");
        let data = vec![b'x'; HASH_BUFFER_SIZE * 3 + 17];
        fs::write(&path, &data).expect("write");

        assert_eq!(file_hash(&path).expect("hash"), bytes_hash(&data));
    }

    #[test]
    fn test_file_hash_changes_with_one_byte() {
        assert_ne!(bytes_hash(b"[]"), bytes_hash(b"[ ]"));
    }

    #[test]
    fn test_file_hash_missing_file() {
        let temp = TempDir::new().expect("temp dir");
        assert!(file_hash(&temp.path().join("nope.json")).is_err());
    }
}
