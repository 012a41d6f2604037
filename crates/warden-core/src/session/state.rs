//! Session state model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::ToolCategory;
use crate::crypto::{SessionSigner, SignerError};

/// The session's signing keypair, serialized as hex.
///
/// The private key lives in the session file; the file inherits whatever
/// protection the operator gives the storage root. Keys are session-scoped
/// and never rotated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SigningIdentity {
    /// Secret key, lowercase hex of the 32-byte encoding.
    pub private_key: String,
    /// Public key, lowercase hex of the 32-byte encoding.
    pub public_key: String,
    /// Short identifier: last 32 hex characters of the public key.
    pub key_id: String,
}

/// Mutable per-session state, overwritten as a whole on each change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    /// Opaque session identifier supplied by the host.
    pub session_id: String,
    /// When the session state was first created.
    pub started_at: DateTime<Utc>,
    /// Dense counter of recorded calls, starting at 0.
    pub action_index: u64,
    /// Id of the last R6 request in the chain; empty before the first call.
    pub last_r6_id: String,
    /// Calls per tool name.
    pub tool_counts: BTreeMap<String, u64>,
    /// Calls per category.
    pub category_counts: BTreeMap<String, u64>,
    /// The policy bundle active for this session.
    pub policy_entity_id: String,
    /// The session signing keypair.
    pub signing: SigningIdentity,
}

impl SessionState {
    /// Creates a fresh session state with a newly generated keypair.
    #[must_use]
    pub fn new(session_id: impl Into<String>, policy_entity_id: impl Into<String>) -> Self {
        let signer = SessionSigner::generate();
        Self {
            session_id: session_id.into(),
            started_at: Utc::now(),
            action_index: 0,
            last_r6_id: String::new(),
            tool_counts: BTreeMap::new(),
            category_counts: BTreeMap::new(),
            policy_entity_id: policy_entity_id.into(),
            signing: SigningIdentity {
                private_key: signer.secret_key_hex().to_string(),
                public_key: signer.public_key_hex(),
                key_id: signer.key_id(),
            },
        }
    }

    /// Reconstructs the signer from the stored secret key.
    ///
    /// # Errors
    ///
    /// Returns [`SignerError`] if the stored key material is corrupt.
    pub fn signer(&self) -> Result<SessionSigner, SignerError> {
        SessionSigner::from_secret_hex(&self.signing.private_key)
    }

    /// Advances the counters after a call has been recorded.
    pub fn record_action(&mut self, tool: &str, category: ToolCategory, r6_id: String) {
        self.action_index += 1;
        self.last_r6_id = r6_id;
        *self.tool_counts.entry(tool.to_string()).or_insert(0) += 1;
        *self
            .category_counts
            .entry(category.as_str().to_string())
            .or_insert(0) += 1;
    }
}
