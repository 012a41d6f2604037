//! Cryptographic primitives for the governance core.
//!
//! This module provides the hash and signature primitives used by the audit
//! chain:
//!
//! - **SHA-256 hashing**: input/output hashes and chain links are the first
//!   16 hex characters (64 bits) of a SHA-256 digest over UTF-8 bytes
//! - **Ed25519 signatures**: per-session detached signatures over the
//!   serialized audit record, keys serialized as lowercase hex
//!
//! # Hash Chain
//!
//! Each audit record carries a truncated hash of the previous on-disk line,
//! forming a chain rooted at the literal string `"genesis"`. Any mutation of
//! a persisted record breaks the chain at the following record.
//!
//! # Signatures
//!
//! The signature covers the serialization of the record with the signature
//! fields absent. Verification is a plain boolean and never panics on
//! malformed input.

mod hash;
mod sign;

pub use hash::{SHORT_HASH_LEN, sha256_hex, short_hash, short_hash_str};
pub use sign::{
    KEY_ID_HEX_LEN, SessionSigner, SignerError, key_id_from_public_hex, verify_signature,
};
