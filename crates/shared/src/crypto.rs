//! Cryptographic helpers for device credentials.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input and returns it as a hex string.
pub fn sha256_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compares two secrets in constant time with respect to their contents.
///
/// Both inputs are hashed first so the comparison length never depends on
/// the presented value.
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    let a = sha256_hex(expected);
    let b = sha256_hex(presented);
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
