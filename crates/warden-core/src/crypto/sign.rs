//! Ed25519 detached signatures for audit records.
//!
//! Every session owns one signing keypair, generated when the session state
//! is first created. Keys travel as lowercase hex of their canonical 32-byte
//! encodings; signatures as hex of the 64-byte detached signature.
//!
//! Verification returns a plain boolean: malformed keys, malformed
//! signatures, and mismatches all yield `false`, never a panic or an error.

use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use thiserror::Error;
use zeroize::Zeroizing;

/// Length in hex characters of a signing key identifier (last 16 bytes of
/// the public key).
pub const KEY_ID_HEX_LEN: usize = 32;

/// Errors from loading key material.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SignerError {
    /// The provided key bytes could not be decoded or had the wrong length.
    #[error("invalid key material: {reason}")]
    InvalidKey {
        /// Why the key was rejected.
        reason: String,
    },
}

/// A session-scoped Ed25519 signer.
///
/// Wraps the secret key and signs arbitrary byte strings. The secret key is
/// only exported through a zeroizing container.
pub struct SessionSigner {
    signing_key: SigningKey,
}

impl SessionSigner {
    /// Generates a fresh keypair.
    #[must_use]
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    /// Loads a signer from the hex encoding of a 32-byte secret key.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError::InvalidKey`] if the hex does not decode to
    /// exactly 32 bytes.
    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, SignerError> {
        let bytes = hex::decode(secret_hex).map_err(|e| SignerError::InvalidKey {
            reason: e.to_string(),
        })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|_| SignerError::InvalidKey {
            reason: "secret key must be 32 bytes".to_string(),
        })?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    /// Returns the public key as lowercase hex.
    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    /// Returns the secret key as lowercase hex inside a zeroizing container.
    #[must_use]
    pub fn secret_key_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing_key.to_bytes()))
    }

    /// Returns the short key identifier: the last [`KEY_ID_HEX_LEN`] hex
    /// characters of the public key.
    #[must_use]
    pub fn key_id(&self) -> String {
        key_id_from_public_hex(&self.public_key_hex())
    }

    /// Signs a message, returning the detached signature as lowercase hex.
    #[must_use]
    pub fn sign_hex(&self, message: &[u8]) -> String {
        hex::encode(self.signing_key.sign(message).to_bytes())
    }
}

/// Derives the short key identifier from a hex-encoded public key.
///
/// Returns the last [`KEY_ID_HEX_LEN`] characters, or the whole string when
/// it is shorter than that.
#[must_use]
pub fn key_id_from_public_hex(public_hex: &str) -> String {
    let start = public_hex.len().saturating_sub(KEY_ID_HEX_LEN);
    public_hex[start..].to_string()
}

/// Verifies a detached signature over a message.
///
/// All failure modes — undecodable key, undecodable signature, wrong
/// lengths, verification mismatch — return `false`.
#[must_use]
pub fn verify_signature(public_key_hex: &str, message: &[u8], signature_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key_bytes) = <[u8; 32]>::try_from(key_bytes) else {
        return false;
    };
    let Ok(verifying_key) = VerifyingKey::from_bytes(&key_bytes) else {
        return false;
    };
    let Ok(sig_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(sig_bytes) = <[u8; 64]>::try_from(sig_bytes) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_bytes);
    verifying_key.verify(message, &signature).is_ok()
}
