//! Content hashing utilities
//!
//! SHA-256 based hashes for file change detection and node identifier
//! fragments.

use sha2::{Digest, Sha256};

/// Full content hash of a source file (64 hex chars)
pub fn file_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex_string(&hasher.finalize())
}

/// Short content hash over a canonical serialization (8 hex chars)
pub fn short_hash(canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    hex_string(&digest[..4])
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}
