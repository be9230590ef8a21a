//! Content hashing used as the store's dedup lookup key.

use sha2::{Digest, Sha256};

/// Length of the hex prefix sent to the store's hash lookup.
pub const DEFAULT_HASH_LEN: usize = 32;

/// Lowercase hex SHA-256 of `bytes`, truncated to `len` characters.
///
/// The truncated digest is a lookup hint; the store resolves any collision.
pub fn content_hash(bytes: &[u8], len: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(len);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_digest_prefix() {
        // sha256("hello")
        assert_eq!(
            content_hash(b"hello", DEFAULT_HASH_LEN),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e"
        );
    }

    #[test]
    fn full_length_when_len_exceeds_digest() {
        assert_eq!(content_hash(b"", 128).len(), 64);
    }
}
