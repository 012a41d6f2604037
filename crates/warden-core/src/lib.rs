//! # warden-core
//!
//! Governance core for autonomous agents: a policy gate and tamper-evident
//! audit trail interposed between an agent host and the tools it invokes.
//!
//! For every proposed tool call the layer renders a policy decision
//! (allow / warn / deny), and for every completed call it appends a signed,
//! hash-linked record to a per-session audit log. The operator can always
//! answer: what did the agent do, under which policy, and is the log
//! intact.
//!
//! ## Components
//!
//! - **Classification**: tool name → category, target extraction, and
//!   credential/memory sensitivity scanning
//! - **Policy**: ordered rule evaluation with glob/regex matching
//!   (ReDoS-hardened), temporal windows, sliding-window rate limits, and
//!   preset bundles (`permissive`, `safety`, `strict`, `audit-only`)
//! - **Audit**: per-session append-only JSONL chains with Ed25519
//!   signatures and streaming verification
//! - **Events**: a best-effort JSONL side-channel with severity filtering
//!   and size-bounded rotation
//!
//! ## Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use warden_core::policy::PolicyConfig;
//! use warden_core::{Governance, GovernanceConfig, Outcome};
//!
//! # fn main() -> Result<(), warden_core::GovernanceError> {
//! let config = GovernanceConfig::new(
//!     GovernanceConfig::default_root(),
//!     PolicyConfig::preset("safety"),
//! );
//! let governance = Governance::open(config)?;
//!
//! let params = json!({"command": "rm -rf /tmp/scratch"});
//! let verdict = governance.pre_call("session-1", "Bash", &params);
//! if !verdict.should_block() {
//!     // ... run the tool ...
//! }
//! governance.post_call(
//!     "session-1",
//!     "Bash",
//!     &params,
//!     Some(Outcome::Success { output: None, duration_ms: Some(12) }),
//! )?;
//!
//! let report = governance.verify("session-1")?;
//! assert!(report.valid);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod audit;
pub mod classifier;
pub mod crypto;
pub mod determinism;
pub mod events;
pub mod governance;
pub mod matcher;
pub mod policy;
pub mod rate_limit;
pub mod session;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::audit::{AuditRecord, FilterCriteria, RecordStatus, VerifyReport};
    pub use crate::classifier::ToolCategory;
    pub use crate::events::{Event, EventType, Severity};
    pub use crate::governance::{Governance, GovernanceConfig, Outcome, RecordedCall, Verdict};
    pub use crate::policy::{Decision, PolicyConfig, PolicyRule};
}

pub use classifier::ToolCategory;
pub use governance::{
    Governance, GovernanceConfig, GovernanceError, Outcome, RecordedCall, Verdict,
};
pub use policy::{Decision, PolicyConfig, PolicyEngine};
