//! SHA-256 checksum utilities
//!
//! Provides a single canonical checksum format (`sha256:<hex>`) used for
//! plaintext content hashes in the manifest.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Prefix for all checksums produced by this module
pub const PREFIX: &str = "sha256:";

/// Size of the read buffer for streaming hashing
const HASH_BUFFER_SIZE: usize = 8192;

/// Compute the SHA-256 checksum of in-memory content.
///
/// Returns a string in the canonical format `"sha256:<hex>"`.
pub fn compute_content_checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Compute the SHA-256 checksum of everything a reader yields.
pub fn compute_reader_checksum<R: Read>(mut reader: R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; HASH_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{}{:x}", PREFIX, hasher.finalize()))
}

/// Compute the SHA-256 checksum of a file's contents without loading the
/// whole file into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be opened or read.
pub fn compute_file_checksum(path: &Path) -> io::Result<String> {
    let file = File::open(path)?;
    compute_reader_checksum(file)
}

/// Check that a string is a well-formed canonical checksum.
pub fn is_valid_checksum(value: &str) -> bool {
    value.strip_prefix(PREFIX).is_some_and(|hex| {
        hex.len() == 64 && hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_checksum_has_prefix() {
        let checksum = compute_content_checksum(b"hello world");
        assert!(checksum.starts_with("sha256:"));
    }

    #[test]
    fn content_checksum_known_value() {
        let checksum = compute_content_checksum(b"hello world");
        assert_eq!(
            checksum,
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn different_content_different_checksum() {
        let a = compute_content_checksum(b"aaa");
        let b = compute_content_checksum(b"bbb");
        assert_ne!(a, b);
    }

    #[test]
    fn file_checksum_matches_content_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.txt");
        std::fs::write(&path, "hello world").unwrap();

        let file_cs = compute_file_checksum(&path).unwrap();
        let content_cs = compute_content_checksum(b"hello world");
        assert_eq!(file_cs, content_cs);
    }

    #[test]
    fn streaming_spans_multiple_buffers() {
        let content = vec![7u8; HASH_BUFFER_SIZE * 3 + 17];
        let streamed = compute_reader_checksum(content.as_slice()).unwrap();
        assert_eq!(streamed, compute_content_checksum(&content));
    }

    #[test]
    fn validates_canonical_form() {
        assert!(is_valid_checksum(&compute_content_checksum(b"x")));
        assert!(!is_valid_checksum("md5:abc"));
        assert!(!is_valid_checksum("sha256:XYZ"));
        assert!(!is_valid_checksum(
            "sha256:B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
        ));
    }
}
