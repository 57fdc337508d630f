//! Hashing helpers

use sha2::{Digest, Sha256};

/// Compute the lowercase hex SHA-256 digest of the input
pub fn sha256_hex(data: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_ref());
    hex::encode(hasher.finalize())
}

/// Short stable identifier derived from the SHA-256 digest (first 16 hex chars)
pub fn short_hash(data: impl AsRef<[u8]>) -> String {
    let mut digest = sha256_hex(data);
    digest.truncate(16);
    digest
}
