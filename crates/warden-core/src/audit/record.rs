//! R6 request envelopes and audit records.
//!
//! Every recorded tool call produces two linked documents: an [`R6Request`]
//! capturing what was asked under which rules (Rules, Role, Request,
//! Reference, Resource), and an [`AuditRecord`] capturing the Result. The
//! record is the unit of the hash chain.
//!
//! # Field-Order Contract
//!
//! The structs here serialize in declaration order, and that order is the
//! wire contract: signature verification re-serializes a parsed record with
//! the signature fields stripped and must reproduce the signed bytes
//! exactly. Reordering fields is a breaking change to every existing log.

use chrono::{DateTime, Utc};
use rand::Rng as _;
use serde::{Deserialize, Serialize};

use crate::classifier::ToolCategory;
use crate::crypto::short_hash;
use crate::determinism::canonical_json;

/// Binding type for session-scoped software identity.
pub const SOFT_LCT_BINDING: &str = "soft-lct";

/// How much detail audit records carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    /// Targets and hashes only.
    Minimal,
    /// The default level.
    #[default]
    Standard,
    /// Full constraint and target detail.
    Verbose,
}

/// Outcome classification of a recorded call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    /// The tool ran and returned normally.
    Success,
    /// The tool ran and failed.
    Error,
    /// The call was blocked by policy before running.
    Blocked,
}

impl RecordStatus {
    /// Returns the wire name of the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Blocked => "blocked",
        }
    }
}

/// Rules section: under which policy the call was decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Rules {
    /// Audit verbosity in effect.
    pub audit_level: AuditLevel,
    /// Constraint strings from policy evaluation (`ruleId=…`, …).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraints: Vec<String>,
    /// The content-addressed policy bundle identifier.
    pub policy_entity_id: String,
}

/// Role section: who is acting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Role {
    /// The session this call belongs to.
    pub session_id: String,
    /// Optional host-supplied agent identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Position of this call in the session, starting at 0.
    pub action_index: u64,
    /// Identity binding type; always [`SOFT_LCT_BINDING`].
    pub binding_type: String,
}

/// Request section: what is being asked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Call {
    /// Tool name as the host reported it.
    pub tool: String,
    /// Classified category.
    pub category: ToolCategory,
    /// Primary target, if one was extracted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Secondary targets, when they add to the primary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
    /// Truncated SHA-256 over the canonical JSON of the parameters.
    pub input_hash: String,
}

/// Reference section: where this call sits in the chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Reference {
    /// The session this call belongs to.
    pub session_id: String,
    /// Id of the previous R6 request; empty for the first call.
    pub prev_r6_id: String,
    /// Chain position, equal to the action index.
    pub chain_position: u64,
}

/// Resource section: cost and approval expectations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Resource {
    /// Estimated token cost, when the host supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_tokens: Option<u64>,
    /// Whether the decision asks for operator review.
    pub approval_required: bool,
}

/// The structured request envelope, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R6Request {
    /// `r6:`-prefixed random identifier.
    pub id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Rules section.
    pub rules: R6Rules,
    /// Role section.
    pub role: R6Role,
    /// Request section.
    pub request: R6Call,
    /// Reference section.
    pub reference: R6Reference,
    /// Resource section.
    pub resource: R6Resource,
}

/// Result carried by an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResult {
    /// Outcome classification.
    pub status: RecordStatus,
    /// Truncated SHA-256 of the tool output, when captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_hash: Option<String>,
    /// Error message for failed calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Wall-clock duration of the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl RecordResult {
    /// Result for a policy-blocked call.
    #[must_use]
    pub const fn blocked() -> Self {
        Self {
            status: RecordStatus::Blocked,
            output_hash: None,
            error_message: None,
            duration_ms: None,
        }
    }

    /// Result for a successful call; the output, when given, is hashed.
    #[must_use]
    pub fn success(output: Option<&str>, duration_ms: Option<u64>) -> Self {
        Self {
            status: RecordStatus::Success,
            output_hash: output.map(|o| short_hash(o.as_bytes())),
            error_message: None,
            duration_ms,
        }
    }

    /// Result for a failed call.
    #[must_use]
    pub fn error(message: impl Into<String>, duration_ms: Option<u64>) -> Self {
        Self {
            status: RecordStatus::Error,
            output_hash: None,
            error_message: Some(message.into()),
            duration_ms,
        }
    }
}

/// Provenance section binding a record to its session and predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// The session this record belongs to.
    pub session_id: String,
    /// Dense position in the session log.
    pub action_index: u64,
    /// Truncated SHA-256 of the previous on-disk line, or `"genesis"`.
    pub prev_record_hash: String,
}

/// One line of a session's audit log. Field order is the wire contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// `audit:`-prefixed identifier derived from the R6 id.
    pub record_id: String,
    /// The R6 request this record resolves.
    pub r6_request_id: String,
    /// Recording time.
    pub timestamp: DateTime<Utc>,
    /// Tool name.
    pub tool: String,
    /// Classified category.
    pub category: ToolCategory,
    /// Primary target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Secondary targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub targets: Option<Vec<String>>,
    /// Call result.
    pub result: RecordResult,
    /// Chain provenance.
    pub provenance: Provenance,
    /// Detached Ed25519 signature over the unsigned serialization, hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Short id of the signing key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key_id: Option<String>,
}

impl AuditRecord {
    /// Assembles an unsigned record from an R6 request and a result.
    #[must_use]
    pub fn from_r6(r6: &R6Request, result: RecordResult, prev_record_hash: String) -> Self {
        let suffix = r6.id.strip_prefix("r6:").unwrap_or(&r6.id);
        Self {
            record_id: format!("audit:{suffix}"),
            r6_request_id: r6.id.clone(),
            timestamp: Utc::now(),
            tool: r6.request.tool.clone(),
            category: r6.request.category,
            target: r6.request.target.clone(),
            targets: r6.request.targets.clone(),
            result,
            provenance: Provenance {
                session_id: r6.role.session_id.clone(),
                action_index: r6.role.action_index,
                prev_record_hash,
            },
            signature: None,
            signing_key_id: None,
        }
    }

    /// Serializes the record with the signature fields stripped — the byte
    /// string that signatures cover.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if the record cannot be rendered.
    pub fn unsigned_line(&self) -> Result<String, serde_json::Error> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        unsigned.signing_key_id = None;
        serde_json::to_string(&unsigned)
    }
}

/// Builder assembling an [`R6Request`].
#[derive(Debug, Clone)]
pub struct R6Builder {
    session_id: String,
    tool: String,
    category: ToolCategory,
    agent_id: Option<String>,
    action_index: u64,
    prev_r6_id: String,
    target: Option<String>,
    targets: Vec<String>,
    input_hash: String,
    audit_level: AuditLevel,
    constraints: Vec<String>,
    policy_entity_id: String,
    estimated_tokens: Option<u64>,
    approval_required: bool,
}

impl R6Builder {
    /// Starts a builder for one call.
    #[must_use]
    pub fn new(
        session_id: impl Into<String>,
        tool: impl Into<String>,
        category: ToolCategory,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            tool: tool.into(),
            category,
            agent_id: None,
            action_index: 0,
            prev_r6_id: String::new(),
            target: None,
            targets: Vec::new(),
            input_hash: short_hash(b"null"),
            audit_level: AuditLevel::default(),
            constraints: Vec::new(),
            policy_entity_id: String::new(),
            estimated_tokens: None,
            approval_required: false,
        }
    }

    /// Sets the agent identity.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self
    }

    /// Sets the chain position: the current action index and the previous
    /// R6 id (empty for the first call).
    #[must_use]
    pub fn with_chain(mut self, action_index: u64, prev_r6_id: impl Into<String>) -> Self {
        self.action_index = action_index;
        self.prev_r6_id = prev_r6_id.into();
        self
    }

    /// Sets the primary and secondary targets.
    #[must_use]
    pub fn with_targets(mut self, target: Option<String>, targets: Vec<String>) -> Self {
        self.target = target;
        self.targets = targets;
        self
    }

    /// Hashes the tool parameters into the input hash.
    #[must_use]
    pub fn with_params(mut self, params: &serde_json::Value) -> Self {
        self.input_hash = short_hash(canonical_json(params).as_bytes());
        self
    }

    /// Sets the audit level.
    #[must_use]
    pub const fn with_audit_level(mut self, level: AuditLevel) -> Self {
        self.audit_level = level;
        self
    }

    /// Sets the policy binding: entity id and evaluation constraints.
    #[must_use]
    pub fn with_policy(mut self, entity_id: impl Into<String>, constraints: Vec<String>) -> Self {
        self.policy_entity_id = entity_id.into();
        self.constraints = constraints;
        self
    }

    /// Sets the resource expectations.
    #[must_use]
    pub const fn with_resource(
        mut self,
        estimated_tokens: Option<u64>,
        approval_required: bool,
    ) -> Self {
        self.estimated_tokens = estimated_tokens;
        self.approval_required = approval_required;
        self
    }

    /// Builds the request, assigning a fresh random id.
    #[must_use]
    pub fn build(self) -> R6Request {
        let targets = if self.targets.is_empty() {
            None
        } else {
            Some(self.targets)
        };
        R6Request {
            id: format!("r6:{}", random_suffix()),
            timestamp: Utc::now(),
            rules: R6Rules {
                audit_level: self.audit_level,
                constraints: self.constraints,
                policy_entity_id: self.policy_entity_id,
            },
            role: R6Role {
                session_id: self.session_id.clone(),
                agent_id: self.agent_id,
                action_index: self.action_index,
                binding_type: SOFT_LCT_BINDING.to_string(),
            },
            request: R6Call {
                tool: self.tool,
                category: self.category,
                target: self.target,
                targets,
                input_hash: self.input_hash,
            },
            reference: R6Reference {
                session_id: self.session_id,
                prev_r6_id: self.prev_r6_id,
                chain_position: self.action_index,
            },
            resource: R6Resource {
                estimated_tokens: self.estimated_tokens,
                approval_required: self.approval_required,
            },
        }
    }
}

/// Eight random lowercase hex characters.
fn random_suffix() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn sample_r6() -> R6Request {
        R6Builder::new("sess-1", "Bash", ToolCategory::Command)
            .with_chain(3, "r6:00000000")
            .with_targets(Some("rm -rf /tmp".to_string()), vec!["/tmp".to_string()])
            .with_params(&json!({"command": "rm -rf /tmp"}))
            .with_policy("policy:safety:1:abc", vec!["ruleId=deny-destructive-commands".into()])
            .build()
    }

    #[test]
    fn r6_ids_are_prefixed_and_random() {
        let a = sample_r6();
        let b = sample_r6();
        assert!(a.id.starts_with("r6:"));
        assert_eq!(a.id.len(), 3 + 8);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn record_id_derives_from_r6_suffix() {
        let r6 = sample_r6();
        let record = AuditRecord::from_r6(&r6, RecordResult::blocked(), "genesis".to_string());
        let suffix = r6.id.strip_prefix("r6:").unwrap();
        assert_eq!(record.record_id, format!("audit:{suffix}"));
        assert_eq!(record.r6_request_id, r6.id);
    }

    #[test]
    fn input_hash_is_canonical_over_key_order() {
        let a = R6Builder::new("s", "Read", ToolCategory::FileRead)
            .with_params(&json!({"file_path": "/a", "limit": 10}))
            .build();
        let b = R6Builder::new("s", "Read", ToolCategory::FileRead)
            .with_params(&json!({"limit": 10, "file_path": "/a"}))
            .build();
        assert_eq!(a.request.input_hash, b.request.input_hash);
        assert_eq!(a.request.input_hash.len(), 16);
    }

    #[test]
    fn chain_position_mirrors_action_index() {
        let r6 = sample_r6();
        assert_eq!(r6.role.action_index, 3);
        assert_eq!(r6.reference.chain_position, 3);
        assert_eq!(r6.reference.prev_r6_id, "r6:00000000");
        assert_eq!(r6.role.binding_type, SOFT_LCT_BINDING);
    }

    #[test]
    fn empty_target_list_is_omitted() {
        let r6 = R6Builder::new("s", "TodoWrite", ToolCategory::State).build();
        assert!(r6.request.targets.is_none());

        let json = serde_json::to_string(&r6).unwrap();
        assert!(!json.contains("\"targets\""));
    }

    #[test]
    fn wire_field_order_is_stable() {
        let r6 = sample_r6();
        let record = AuditRecord::from_r6(
            &r6,
            RecordResult::success(Some("ok"), Some(12)),
            "genesis".to_string(),
        );
        let line = serde_json::to_string(&record).unwrap();

        let record_id_at = line.find("\"recordId\"").unwrap();
        let r6_at = line.find("\"r6RequestId\"").unwrap();
        let result_at = line.find("\"result\"").unwrap();
        let provenance_at = line.find("\"provenance\"").unwrap();
        assert!(record_id_at < r6_at && r6_at < result_at && result_at < provenance_at);
    }

    #[test]
    fn unsigned_line_strips_signature_fields() {
        let r6 = sample_r6();
        let mut record = AuditRecord::from_r6(&r6, RecordResult::blocked(), "genesis".to_string());
        record.signature = Some("ab".repeat(64));
        record.signing_key_id = Some("cd".repeat(16));

        let unsigned = record.unsigned_line().unwrap();
        assert!(!unsigned.contains("signature"));
        assert!(!unsigned.contains("signingKeyId"));

        // Re-serializing a parse of the unsigned line reproduces it exactly.
        let reparsed: AuditRecord = serde_json::from_str(&unsigned).unwrap();
        assert_eq!(serde_json::to_string(&reparsed).unwrap(), unsigned);
    }

    #[test]
    fn record_round_trips_through_json() {
        let r6 = sample_r6();
        let record = AuditRecord::from_r6(
            &r6,
            RecordResult::error("command failed", Some(5)),
            "0123456789abcdef".to_string(),
        );
        let line = serde_json::to_string(&record).unwrap();
        let restored: AuditRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(record, restored);
    }
}
