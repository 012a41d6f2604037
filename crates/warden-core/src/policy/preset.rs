//! Named preset rule bundles.
//!
//! Presets give operators a vetted starting point; custom rules concatenate
//! after the preset's own. The `safety` bundle encodes the command-matching
//! contract for destructive shell commands:
//!
//! - `rm` followed by any flag cluster (`rm -rf …`, `rm -r …`) is denied by
//!   `deny-destructive-commands`, as is any `mkfs.*` invocation
//! - a bare `rm <path>` with no flags falls through to `warn-file-delete`
//!
//! The exact regexes are exported as constants so hosts can document and
//! test against them.

use super::PolicyError;
use super::schema::{Decision, PolicyConfig, PolicyRule, RuleMatch};
use crate::classifier::ToolCategory;

/// Names of the built-in presets.
pub const PRESET_NAMES: &[&str] = &["permissive", "safety", "strict", "audit-only"];

/// Commands denied outright: `rm` with a flag cluster, or any `mkfs.*`.
pub const DESTRUCTIVE_COMMAND_PATTERNS: &[&str] = &[r"^rm\s+-\S+", r"^mkfs\.\S+"];

/// Commands warned about: any remaining `rm` (flagless delete).
pub const FILE_DELETE_PATTERN: &str = r"^rm\s+\S+";

/// A preset's defaults plus its rule bundle.
#[derive(Debug, Clone)]
pub struct PresetBundle {
    /// Decision when no rule matches.
    pub default_policy: Decision,
    /// Whether deny decisions block.
    pub enforce: bool,
    /// The bundled rules, already ordered by priority.
    pub rules: Vec<PolicyRule>,
}

/// Resolves a preset by name.
///
/// # Errors
///
/// Returns [`PolicyError::UnknownPreset`] for unrecognized names.
pub fn preset_bundle(name: &str) -> Result<PresetBundle, PolicyError> {
    match name {
        "permissive" => Ok(PresetBundle {
            default_policy: Decision::Allow,
            enforce: false,
            rules: Vec::new(),
        }),
        "safety" => Ok(PresetBundle {
            default_policy: Decision::Allow,
            enforce: true,
            rules: safety_rules(),
        }),
        "strict" => Ok(PresetBundle {
            default_policy: Decision::Deny,
            enforce: true,
            rules: strict_rules(),
        }),
        "audit-only" => Ok(PresetBundle {
            default_policy: Decision::Allow,
            enforce: false,
            rules: safety_rules(),
        }),
        other => Err(PolicyError::UnknownPreset {
            name: other.to_string(),
        }),
    }
}

/// Glob patterns for credential-bearing paths, mirroring the classifier's
/// escalation set. Used where a rule must catch credentials by target (e.g.
/// shell commands, which never escalate by category).
fn credential_globs() -> Vec<String> {
    [
        "**/.env",
        "**/.env.*",
        "**/credentials.*",
        "**/secret.*",
        "**/secrets.*",
        "**/.aws/credentials",
        "**/.ssh/id_*",
        "**/.ssh/known_hosts",
        "**/.netrc",
        "**/.pgpass",
        "**/.npmrc",
        "**/.pypirc",
        "**/token*.json",
        "**/auth*.json",
        "**/apikey*",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

/// Glob patterns for agent-memory files.
fn memory_globs() -> Vec<String> {
    [
        "**/MEMORY.md",
        "**/memory.md",
        "**/memory/*.md",
        "**/.moltbot/**memory**",
        "**/.clawdbot/**memory**",
        "**/.openclaw/**memory**",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}

fn safety_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new("deny-destructive-commands", 1, Decision::Deny)
            .with_reason("destructive shell command")
            .with_criteria(RuleMatch {
                tools: Some(vec!["Bash".to_string()]),
                target_patterns: Some(
                    DESTRUCTIVE_COMMAND_PATTERNS
                        .iter()
                        .map(|s| (*s).to_string())
                        .collect(),
                ),
                target_patterns_are_regex: true,
                ..RuleMatch::default()
            }),
        PolicyRule::new("warn-file-delete", 2, Decision::Warn)
            .with_reason("file deletion")
            .with_criteria(RuleMatch {
                tools: Some(vec!["Bash".to_string()]),
                target_patterns: Some(vec![FILE_DELETE_PATTERN.to_string()]),
                target_patterns_are_regex: true,
                ..RuleMatch::default()
            }),
        PolicyRule::new("deny-secret-files", 5, Decision::Deny)
            .with_reason("credential access")
            .with_criteria(RuleMatch {
                categories: Some(vec![ToolCategory::CredentialAccess]),
                ..RuleMatch::default()
            }),
        // Companion clause: catches credential paths by target where the
        // category never escalates (shell commands, delegation prompts).
        PolicyRule::new("deny-secret-paths", 5, Decision::Deny)
            .with_reason("credential-bearing target")
            .with_criteria(RuleMatch {
                target_patterns: Some(credential_globs()),
                ..RuleMatch::default()
            }),
        PolicyRule::new("warn-memory-write", 10, Decision::Warn)
            .with_reason("agent memory write")
            .with_criteria(RuleMatch {
                categories: Some(vec![ToolCategory::FileWrite]),
                target_patterns: Some(memory_globs()),
                ..RuleMatch::default()
            }),
        PolicyRule::new("warn-network", 20, Decision::Warn)
            .with_reason("network access")
            .with_criteria(RuleMatch {
                categories: Some(vec![ToolCategory::Network]),
                ..RuleMatch::default()
            }),
    ]
}

fn strict_rules() -> Vec<PolicyRule> {
    vec![
        PolicyRule::new("allow-read-tools", 1, Decision::Allow).with_criteria(RuleMatch {
            tools: Some(
                ["Read", "Glob", "Grep", "TodoWrite"]
                    .iter()
                    .map(|s| (*s).to_string())
                    .collect(),
            ),
            ..RuleMatch::default()
        }),
    ]
}

/// Returns the effective config for a preset name, for embedders that want
/// the expanded bundle rather than a `preset:` reference.
///
/// # Errors
///
/// Returns [`PolicyError::UnknownPreset`] for unrecognized names.
pub fn expanded_preset(name: &str) -> Result<PolicyConfig, PolicyError> {
    let bundle = preset_bundle(name)?;
    Ok(PolicyConfig {
        name: Some(name.to_string()),
        version: None,
        default_policy: Some(bundle.default_policy),
        enforce: Some(bundle.enforce),
        preset: None,
        rules: bundle.rules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_documented_presets_resolve() {
        for name in PRESET_NAMES {
            assert!(preset_bundle(name).is_ok(), "preset {name} should resolve");
        }
    }

    #[test]
    fn unknown_preset_is_rejected() {
        assert!(matches!(
            preset_bundle("paranoid"),
            Err(PolicyError::UnknownPreset { .. })
        ));
    }

    #[test]
    fn permissive_is_empty_and_unenforced() {
        let bundle = preset_bundle("permissive").unwrap();
        assert_eq!(bundle.default_policy, Decision::Allow);
        assert!(!bundle.enforce);
        assert!(bundle.rules.is_empty());
    }

    #[test]
    fn audit_only_mirrors_safety_rules_without_enforcement() {
        let safety = preset_bundle("safety").unwrap();
        let audit = preset_bundle("audit-only").unwrap();

        assert!(safety.enforce);
        assert!(!audit.enforce);
        let safety_ids: Vec<&str> = safety.rules.iter().map(|r| r.id.as_str()).collect();
        let audit_ids: Vec<&str> = audit.rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(safety_ids, audit_ids);
    }

    #[test]
    fn strict_denies_by_default_allowing_read_tools() {
        let bundle = preset_bundle("strict").unwrap();
        assert_eq!(bundle.default_policy, Decision::Deny);
        assert!(bundle.enforce);
        assert_eq!(bundle.rules.len(), 1);
        assert_eq!(bundle.rules[0].id, "allow-read-tools");
    }

    #[test]
    fn safety_rule_priorities_match_the_documented_order() {
        let bundle = preset_bundle("safety").unwrap();
        let order: Vec<(i64, &str)> = bundle
            .rules
            .iter()
            .map(|r| (r.priority, r.id.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, "deny-destructive-commands"),
                (2, "warn-file-delete"),
                (5, "deny-secret-files"),
                (5, "deny-secret-paths"),
                (10, "warn-memory-write"),
                (20, "warn-network"),
            ]
        );
    }
}
