//! Ordered rule evaluation.
//!
//! The engine compiles a [`PolicyConfig`] once — resolving the preset,
//! compiling every target pattern, parsing timezones — and then evaluates
//! calls without further allocation of compiled state. Construction fails
//! on the first invalid rule; evaluation itself is total.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, FixedOffset, Local, Timelike, Utc};

use super::preset::preset_bundle;
use super::schema::{Decision, PolicyConfig, PolicyRule};
use super::PolicyError;
use crate::classifier::ToolCategory;
use crate::crypto::sha256_hex;
use crate::determinism::canonical_json;
use crate::matcher::{CompiledPatterns, matches_rule};
use crate::rate_limit::RateLimiter;

/// Default bundle name when neither config nor preset supplies one.
const DEFAULT_BUNDLE_NAME: &str = "custom";

/// Default bundle version.
const DEFAULT_BUNDLE_VERSION: &str = "1";

/// Timezone a rule window is interpreted in.
#[derive(Debug, Clone, Copy)]
enum RuleTz {
    Utc,
    Fixed(FixedOffset),
}

#[derive(Debug, Clone)]
struct CompiledWindow {
    hours: Option<[u32; 2]>,
    days: Option<Vec<u32>>,
    tz: Option<RuleTz>,
}

impl CompiledWindow {
    fn matches(&self, now: DateTime<Utc>) -> bool {
        let (hour, weekday) = match self.tz {
            Some(RuleTz::Utc) => (now.hour(), now.weekday().num_days_from_sunday()),
            Some(RuleTz::Fixed(offset)) => {
                let local = now.with_timezone(&offset);
                (local.hour(), local.weekday().num_days_from_sunday())
            }
            None => {
                let local = now.with_timezone(&Local);
                (local.hour(), local.weekday().num_days_from_sunday())
            }
        };

        if let Some([start, end]) = self.hours {
            let in_hours = match start.cmp(&end) {
                Ordering::Less => hour >= start && hour < end,
                // start > end wraps midnight.
                Ordering::Greater => hour >= start || hour < end,
                // A zero-width window admits nothing.
                Ordering::Equal => false,
            };
            if !in_hours {
                return false;
            }
        }
        if let Some(days) = &self.days {
            if !days.contains(&weekday) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug)]
struct CompiledRule {
    rule: PolicyRule,
    patterns: Option<CompiledPatterns>,
    window: Option<CompiledWindow>,
}

/// A rate-limit clause that fired during evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitHit {
    /// The rate key that exceeded its threshold.
    pub key: String,
    /// In-window count at evaluation time.
    pub current: u64,
    /// The configured maximum.
    pub limit: u64,
    /// The rule carrying the clause.
    pub rule_id: String,
}

/// Result of evaluating one call against the policy.
#[derive(Debug, Clone)]
pub struct PolicyEvaluation {
    /// The policy's decision. Under dry-run this stays `deny` even though
    /// the gate reports `allow`.
    pub decision: Decision,
    /// Id of the rule that fired, if any.
    pub matched_rule: Option<String>,
    /// Whether the decision is binding at the gate.
    pub enforced: bool,
    /// Reason from the matched rule.
    pub reason: Option<String>,
    /// Audit constraints: `ruleId=…`, `rateKey=…`, `window=[09,17]`,
    /// `dryRun=wouldDeny`.
    pub constraints: Vec<String>,
    /// Rate keys of rules whose limit clause passed; the facade records
    /// these once the action is admitted.
    pub pending_rate_keys: Vec<String>,
    /// Set when the firing rule's rate-limit clause was the trigger.
    pub rate_limit_hit: Option<RateLimitHit>,
}

impl PolicyEvaluation {
    /// The decision reported to the agent host: an unenforced deny
    /// surfaces as allow (dry-run).
    #[must_use]
    pub const fn gate_decision(&self) -> Decision {
        if self.enforced { self.decision } else { Decision::Allow }
    }

    /// `true` when the host must block the call.
    #[must_use]
    pub fn should_block(&self) -> bool {
        self.enforced && self.decision == Decision::Deny
    }
}

/// The policy evaluation engine.
#[derive(Debug)]
pub struct PolicyEngine {
    rules: Vec<CompiledRule>,
    default_policy: Decision,
    enforce: bool,
    name: String,
    version: String,
    entity_id: String,
}

impl PolicyEngine {
    /// Compiles a policy configuration.
    ///
    /// Resolves the preset, concatenates custom rules after it, orders by
    /// ascending priority (stable, so insertion order breaks ties), and
    /// validates every pattern, window, and rate clause.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] on an unknown preset, an invalid target
    /// pattern, or a malformed rule field. The whole config is rejected.
    pub fn new(config: PolicyConfig) -> Result<Self, PolicyError> {
        let bundle = match &config.preset {
            Some(name) => Some(preset_bundle(name)?),
            None => None,
        };

        let default_policy = config
            .default_policy
            .or(bundle.as_ref().map(|b| b.default_policy))
            .unwrap_or(Decision::Allow);
        let enforce = config
            .enforce
            .or(bundle.as_ref().map(|b| b.enforce))
            .unwrap_or(true);
        let name = config
            .name
            .clone()
            .or_else(|| config.preset.clone())
            .unwrap_or_else(|| DEFAULT_BUNDLE_NAME.to_string());
        let version = config
            .version
            .clone()
            .unwrap_or_else(|| DEFAULT_BUNDLE_VERSION.to_string());

        let mut rules: Vec<PolicyRule> = bundle.map(|b| b.rules).unwrap_or_default();
        rules.extend(config.rules);
        rules.sort_by_key(|r| r.priority);

        let entity_id = entity_id_for(&name, &version, default_policy, enforce, &rules)?;

        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            compiled.push(compile_rule(rule)?);
        }

        Ok(Self {
            rules: compiled,
            default_policy,
            enforce,
            name,
            version,
            entity_id,
        })
    }

    /// Evaluates a call at the current time.
    #[must_use]
    pub fn evaluate(
        &self,
        tool: &str,
        category: ToolCategory,
        target: Option<&str>,
        limiter: &RateLimiter,
    ) -> PolicyEvaluation {
        self.evaluate_at(tool, category, target, limiter, Utc::now())
    }

    /// Evaluates a call against an explicit clock.
    #[must_use]
    pub fn evaluate_at(
        &self,
        tool: &str,
        category: ToolCategory,
        target: Option<&str>,
        limiter: &RateLimiter,
        now: DateTime<Utc>,
    ) -> PolicyEvaluation {
        let mut pending_rate_keys = Vec::new();

        for compiled in &self.rules {
            let rule = &compiled.rule;
            let criteria = &rule.criteria;

            if !matches_rule(
                tool,
                category,
                target,
                criteria.tools.as_deref(),
                criteria.categories.as_deref(),
                compiled.patterns.as_ref(),
            ) {
                continue;
            }

            if let Some(window) = &compiled.window {
                if !window.matches(now) {
                    continue;
                }
            }

            let mut rate_limit_hit = None;
            if let Some(spec) = &criteria.rate_limit {
                let key = rate_key(rule, tool, category);
                let check = limiter.check(&key, spec.max_count, spec.window_ms);
                if check.allowed {
                    // Below threshold: the clause does not match, but the
                    // key must be recorded if the action is admitted.
                    pending_rate_keys.push(key);
                    continue;
                }
                rate_limit_hit = Some(RateLimitHit {
                    key,
                    current: check.current,
                    limit: check.limit,
                    rule_id: rule.id.clone(),
                });
            }

            let enforced = self.enforce || rule.decision != Decision::Deny;
            let mut constraints = vec![format!("ruleId={}", rule.id)];
            if let Some(hit) = &rate_limit_hit {
                constraints.push(format!("rateKey={}", hit.key));
            }
            if let Some(window) = &compiled.window {
                if let Some([start, end]) = window.hours {
                    constraints.push(format!("window=[{start:02},{end:02}]"));
                }
            }
            if !enforced {
                constraints.push("dryRun=wouldDeny".to_string());
            }

            tracing::debug!(
                tool,
                category = %category,
                rule_id = %rule.id,
                decision = %rule.decision,
                enforced,
                "policy rule matched"
            );

            return PolicyEvaluation {
                decision: rule.decision,
                matched_rule: Some(rule.id.clone()),
                enforced,
                reason: rule.reason.clone(),
                constraints,
                pending_rate_keys,
                rate_limit_hit,
            };
        }

        let enforced = self.enforce || self.default_policy != Decision::Deny;
        let mut constraints = Vec::new();
        if !enforced {
            constraints.push("dryRun=wouldDeny".to_string());
        }
        PolicyEvaluation {
            decision: self.default_policy,
            matched_rule: None,
            enforced,
            reason: None,
            constraints,
            pending_rate_keys,
            rate_limit_hit: None,
        }
    }

    /// The content-addressed policy entity identifier,
    /// `policy:<name>:<version>:<sha256-hex>`.
    #[must_use]
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    /// Bundle name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bundle version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Whether deny decisions block at the gate.
    #[must_use]
    pub const fn enforce(&self) -> bool {
        self.enforce
    }

    /// Decision applied when no rule matches.
    #[must_use]
    pub const fn default_policy(&self) -> Decision {
        self.default_policy
    }

    /// Number of compiled rules.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

/// Builds the canonical rate key for a rule: scoped to the tool when the
/// rule names tools, to the category when it names categories, otherwise
/// global.
fn rate_key(rule: &PolicyRule, tool: &str, category: ToolCategory) -> String {
    if rule.criteria.tools.is_some() {
        format!("ratelimit:{}:tool:{tool}", rule.id)
    } else if rule.criteria.categories.is_some() {
        format!("ratelimit:{}:category:{category}", rule.id)
    } else {
        format!("ratelimit:{}:global", rule.id)
    }
}

fn compile_rule(rule: PolicyRule) -> Result<CompiledRule, PolicyError> {
    let patterns = match &rule.criteria.target_patterns {
        Some(patterns) => Some(
            CompiledPatterns::compile(patterns, rule.criteria.target_patterns_are_regex).map_err(
                |source| PolicyError::InvalidPattern {
                    rule_id: rule.id.clone(),
                    source,
                },
            )?,
        ),
        None => None,
    };

    let window = match &rule.criteria.time_window {
        Some(spec) => {
            if let Some([start, end]) = spec.allowed_hours {
                if start > 23 || end > 24 {
                    return Err(PolicyError::MalformedRule {
                        rule_id: rule.id.clone(),
                        reason: format!("allowedHours [{start},{end}] out of range"),
                    });
                }
            }
            if let Some(days) = &spec.allowed_days {
                if days.iter().any(|d| *d > 6) {
                    return Err(PolicyError::MalformedRule {
                        rule_id: rule.id.clone(),
                        reason: "allowedDays must be 0..=6 (0 = Sunday)".to_string(),
                    });
                }
            }
            let tz = match &spec.timezone {
                Some(tz) => Some(parse_timezone(tz).ok_or_else(|| PolicyError::MalformedRule {
                    rule_id: rule.id.clone(),
                    reason: format!("unparseable timezone '{tz}'"),
                })?),
                None => None,
            };
            Some(CompiledWindow {
                hours: spec.allowed_hours,
                days: spec.allowed_days.clone(),
                tz,
            })
        }
        None => None,
    };

    if let Some(spec) = &rule.criteria.rate_limit {
        if spec.max_count == 0 || spec.window_ms <= 0 {
            return Err(PolicyError::MalformedRule {
                rule_id: rule.id.clone(),
                reason: "rateLimit requires maxCount >= 1 and windowMs >= 1".to_string(),
            });
        }
    }

    Ok(CompiledRule {
        rule,
        patterns,
        window,
    })
}

/// Parses `"UTC"` or a fixed offset such as `"+05:30"` / `"-08:00"`.
fn parse_timezone(tz: &str) -> Option<RuleTz> {
    if tz.eq_ignore_ascii_case("utc") || tz == "Z" {
        return Some(RuleTz::Utc);
    }
    let (sign, rest) = match tz.chars().next()? {
        '+' => (1, &tz[1..]),
        '-' => (-1, &tz[1..]),
        _ => return None,
    };
    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).map(RuleTz::Fixed)
}

fn entity_id_for(
    name: &str,
    version: &str,
    default_policy: Decision,
    enforce: bool,
    rules: &[PolicyRule],
) -> Result<String, PolicyError> {
    let resolved = PolicyConfig {
        name: Some(name.to_string()),
        version: Some(version.to_string()),
        default_policy: Some(default_policy),
        enforce: Some(enforce),
        preset: None,
        rules: rules.to_vec(),
    };
    let value = serde_json::to_value(&resolved).map_err(|e| PolicyError::Parse {
        reason: e.to_string(),
    })?;
    let digest = sha256_hex(canonical_json(&value).as_bytes());
    Ok(format!("policy:{name}:{version}:{digest}"))
}
