// src/utils/hash.rs

//! Content addressing for persisted records.
//!
//! The digest is an integrity/dedup signal for downstream tooling, not a
//! security boundary.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 over the UTF-8 bytes of `title + "\n" + body`.
pub fn content_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update(b"\n");
    hasher.update(body.as_bytes());
    hex::encode(hasher.finalize())
}

/// Whether `value` looks like a hex SHA-256 digest.
#[cfg(test)]
pub(crate) fn is_hex_digest(value: &str) -> bool {
    value.len() == 64 && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
