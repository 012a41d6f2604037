//! Policy rule schema and configuration loading.
//!
//! The wire format is camelCase JSON (or the YAML equivalent):
//!
//! ```json
//! {
//!   "preset": "safety",
//!   "enforce": true,
//!   "rules": [
//!     {
//!       "id": "deny-prod-writes",
//!       "priority": 3,
//!       "decision": "deny",
//!       "match": {
//!         "categories": ["file_write"],
//!         "targetPatterns": ["/srv/prod/**"]
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! `defaultPolicy` and `enforce` are optional: an explicit value wins, then
//! the preset's default, then the global default (`allow`, enforced).

use serde::{Deserialize, Serialize};

use super::PolicyError;
use crate::classifier::ToolCategory;

/// A policy decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// The call may proceed.
    Allow,
    /// The call may proceed; the record is flagged for review.
    Warn,
    /// The call must be blocked (when enforcement is on).
    Deny,
}

impl Decision {
    /// Returns the wire name of the decision.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Warn => "warn",
            Self::Deny => "deny",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sliding-window rate limit attached to a rule.
///
/// The clause matches — and the rule fires — only once the window already
/// holds `maxCount` events: the limiter admits up to N actions and the rule
/// catches the N+1-th.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitSpec {
    /// Number of actions admitted per window.
    pub max_count: u64,
    /// Window size in milliseconds.
    pub window_ms: i64,
}

/// Temporal window constraining when a rule is active.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeWindowSpec {
    /// `[start, end)` hours, exclusive end; `start > end` wraps midnight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_hours: Option<[u32; 2]>,
    /// Days of week, 0 = Sunday … 6 = Saturday.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_days: Option<Vec<u32>>,
    /// Timezone the window is interpreted in: `"UTC"` or a fixed offset
    /// such as `"+05:30"`. Absent means the system timezone.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// Match criteria of a rule. Present fields are AND-combined; an empty
/// match block matches every call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuleMatch {
    /// Tool names the rule applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Categories the rule applies to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<ToolCategory>>,
    /// Target patterns (globs unless `targetPatternsAreRegex`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_patterns: Option<Vec<String>>,
    /// Interpret `targetPatterns` as raw (ReDoS-validated) regexes.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub target_patterns_are_regex: bool,
    /// Rate-limit clause; matches only when the threshold is exceeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitSpec>,
    /// Temporal window; a rule outside its window does not match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_window: Option<TimeWindowSpec>,
}

/// One policy rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRule {
    /// Stable identifier reported in evaluations and audit constraints.
    pub id: String,
    /// Human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Evaluation order: lower priorities are evaluated first.
    pub priority: i64,
    /// Decision when the rule fires.
    pub decision: Decision,
    /// Reason surfaced to the agent host on a match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Match criteria.
    #[serde(rename = "match", default)]
    pub criteria: RuleMatch,
}

impl PolicyRule {
    /// Creates a rule with empty criteria (matches everything).
    #[must_use]
    pub fn new(id: impl Into<String>, priority: i64, decision: Decision) -> Self {
        Self {
            id: id.into(),
            name: None,
            priority,
            decision,
            reason: None,
            criteria: RuleMatch::default(),
        }
    }

    /// Sets the reason and returns self.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the criteria and returns self.
    #[must_use]
    pub fn with_criteria(mut self, criteria: RuleMatch) -> Self {
        self.criteria = criteria;
        self
    }
}

/// A policy bundle as loaded from configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PolicyConfig {
    /// Bundle name, used in the policy entity id. Defaults to the preset
    /// name, or `custom`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Bundle version, used in the policy entity id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Decision when no rule matches. Explicit value > preset default >
    /// `allow`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_policy: Option<Decision>,
    /// Whether deny decisions block. Explicit value > preset default >
    /// `true`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce: Option<bool>,
    /// Preset rule bundle injected ahead of `rules`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    /// Custom rules, concatenated after the preset's.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<PolicyRule>,
}

impl PolicyConfig {
    /// Config selecting a preset with no custom rules.
    #[must_use]
    pub fn preset(name: impl Into<String>) -> Self {
        Self {
            preset: Some(name.into()),
            ..Self::default()
        }
    }

    /// Sets `enforce` and returns self.
    #[must_use]
    pub const fn with_enforce(mut self, enforce: bool) -> Self {
        self.enforce = Some(enforce);
        self
    }

    /// Appends a custom rule and returns self.
    #[must_use]
    pub fn with_rule(mut self, rule: PolicyRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Parses a JSON policy document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] on malformed input.
    pub fn from_json(input: &str) -> Result<Self, PolicyError> {
        serde_json::from_str(input).map_err(|e| PolicyError::Parse {
            reason: e.to_string(),
        })
    }

    /// Parses a YAML policy document.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Parse`] on malformed input.
    pub fn from_yaml(input: &str) -> Result<Self, PolicyError> {
        serde_yaml::from_str(input).map_err(|e| PolicyError::Parse {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_camel_case_json() {
        let config = PolicyConfig::from_json(
            r#"{
                "defaultPolicy": "deny",
                "enforce": false,
                "rules": [{
                    "id": "r1",
                    "priority": 5,
                    "decision": "warn",
                    "match": {
                        "tools": ["Bash"],
                        "targetPatterns": ["^rm\\s"],
                        "targetPatternsAreRegex": true,
                        "rateLimit": {"maxCount": 3, "windowMs": 60000}
                    }
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.default_policy, Some(Decision::Deny));
        assert_eq!(config.enforce, Some(false));
        let rule = &config.rules[0];
        assert_eq!(rule.decision, Decision::Warn);
        assert!(rule.criteria.target_patterns_are_regex);
        assert_eq!(
            rule.criteria.rate_limit,
            Some(RateLimitSpec {
                max_count: 3,
                window_ms: 60_000
            })
        );
    }

    #[test]
    fn parses_yaml_with_time_window() {
        let config = PolicyConfig::from_yaml(
            r"
            preset: safety
            rules:
              - id: office-hours-only
                priority: 3
                decision: deny
                match:
                  categories: [command]
                  timeWindow:
                    allowedHours: [9, 17]
                    allowedDays: [1, 2, 3, 4, 5]
                    timezone: UTC
            ",
        )
        .unwrap();

        assert_eq!(config.preset.as_deref(), Some("safety"));
        let window = config.rules[0].criteria.time_window.as_ref().unwrap();
        assert_eq!(window.allowed_hours, Some([9, 17]));
        assert_eq!(window.timezone.as_deref(), Some("UTC"));
    }

    #[test]
    fn empty_match_block_is_default() {
        let config = PolicyConfig::from_json(
            r#"{"rules": [{"id": "r", "priority": 1, "decision": "allow"}]}"#,
        )
        .unwrap();
        assert_eq!(config.rules[0].criteria, RuleMatch::default());
    }

    #[test]
    fn round_trips_through_json() {
        let config = PolicyConfig::preset("strict").with_rule(
            PolicyRule::new("extra", 50, Decision::Warn).with_criteria(RuleMatch {
                categories: Some(vec![ToolCategory::Network]),
                ..RuleMatch::default()
            }),
        );

        let json = serde_json::to_string(&config).unwrap();
        let restored = PolicyConfig::from_json(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        assert!(matches!(
            PolicyConfig::from_json("{nope"),
            Err(PolicyError::Parse { .. })
        ));
    }
}
