//! Policy evaluation for tool request authorization.
//!
//! This module provides the [`PolicyEngine`] that evaluates proposed tool
//! calls against an ordered rule list. Rules are evaluated by ascending
//! priority (insertion order breaks ties) and the first rule whose clauses
//! all hold determines the decision; otherwise the config's default applies.
//!
//! # Properties
//!
//! - **Deterministic**: same config + same call + same clock always produces
//!   the same decision
//! - **Total**: evaluation never fails; malformed inputs resolve to the
//!   `unknown` category and simply match fewer rules
//! - **Fail-fast at load**: every target pattern, timezone, and window bound
//!   is validated when the engine is constructed, and the whole config is
//!   rejected on the first violation
//! - **Traceable**: every decision carries the matched rule id and a
//!   constraint list that binds the audit record to the evaluation
//!
//! # Dry-Run
//!
//! With `enforce: false`, a matched `deny` is evaluated and logged but not
//! enforced: the gate reports `allow`, the evaluation keeps `decision:
//! deny`, and the audit record's constraints note the would-be denial.

mod engine;
mod preset;
mod schema;

use thiserror::Error;

pub use engine::{PolicyEngine, PolicyEvaluation, RateLimitHit};
pub use preset::{
    DESTRUCTIVE_COMMAND_PATTERNS, FILE_DELETE_PATTERN, PRESET_NAMES, PresetBundle,
    expanded_preset, preset_bundle,
};
pub use schema::{Decision, PolicyConfig, PolicyRule, RateLimitSpec, RuleMatch, TimeWindowSpec};

use crate::matcher::MatcherError;

/// Errors raised while loading a policy configuration.
///
/// All variants are fatal at load: the engine refuses the whole config
/// rather than skipping the offending rule.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PolicyError {
    /// The named preset does not exist.
    #[error("unknown preset: {name}")]
    UnknownPreset {
        /// The preset name that failed to resolve.
        name: String,
    },

    /// A rule's target pattern failed validation or compilation.
    #[error("rule '{rule_id}' has an invalid target pattern: {source}")]
    InvalidPattern {
        /// The offending rule.
        rule_id: String,
        /// The underlying matcher diagnostic.
        source: MatcherError,
    },

    /// A rule carries an out-of-range or unparseable field.
    #[error("rule '{rule_id}' is malformed: {reason}")]
    MalformedRule {
        /// The offending rule.
        rule_id: String,
        /// Why the rule was rejected.
        reason: String,
    },

    /// The config document could not be parsed.
    #[error("failed to parse policy config: {reason}")]
    Parse {
        /// Parser diagnostic.
        reason: String,
    },
}
