//! SHA-256 hashing helpers.
//!
//! All hashes in the governance core are SHA-256. Full digests are encoded
//! as 64-character lowercase hex; the audit chain and input/output hashes
//! use the truncated `short_hash` form.

use sha2::{Digest, Sha256};

/// Length in hex characters of a truncated hash (64 bits of SHA-256).
pub const SHORT_HASH_LEN: usize = 16;

/// Hash arbitrary bytes, returning the full lowercase hex SHA-256 digest.
#[must_use]
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Hash arbitrary bytes, returning the first [`SHORT_HASH_LEN`] hex
/// characters of the SHA-256 digest.
///
/// This is the form used for `inputHash`, `outputHash`, and
/// `prevRecordHash` throughout the audit chain.
#[must_use]
pub fn short_hash(data: &[u8]) -> String {
    let mut digest = sha256_hex(data);
    digest.truncate(SHORT_HASH_LEN);
    digest
}

/// Hash a UTF-8 string, returning the truncated form.
#[must_use]
pub fn short_hash_str(s: &str) -> String {
    short_hash(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_digest_is_64_lowercase_hex_chars() {
        let digest = sha256_hex(b"test");
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn known_vector() {
        // SHA-256("") is a fixed vector.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(short_hash(b""), "e3b0c44298fc1c14");
    }

    #[test]
    fn short_hash_is_prefix_of_full_digest() {
        let full = sha256_hex(b"prefix check");
        let short = short_hash(b"prefix check");
        assert_eq!(short.len(), SHORT_HASH_LEN);
        assert!(full.starts_with(&short));
    }

    #[test]
    fn short_hash_str_matches_bytes() {
        assert_eq!(short_hash_str("hello"), short_hash(b"hello"));
    }

    #[test]
    fn distinct_inputs_distinct_hashes() {
        assert_ne!(short_hash(b"a"), short_hash(b"b"));
    }
}
