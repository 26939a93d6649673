// src/utils/hash.rs
// SHA-256 fingerprinting for cache keys and digests

use sha2::{Digest, Sha256};

/// Compute the hex-encoded SHA-256 of a string.
///
/// Every cache fingerprint and history digest in the core goes through
/// this, so key derivation stays byte-stable across writers.
pub fn sha256_hex(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
