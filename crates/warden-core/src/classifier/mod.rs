//! Tool classification and sensitivity scanning.
//!
//! Maps tool names to coarse categories, extracts the filesystem and network
//! targets a call touches, and flags credential-bearing or agent-memory
//! paths. Classification never fails: unknown tools resolve to
//! [`ToolCategory::Unknown`] and malformed parameter bags simply yield no
//! targets.
//!
//! # Category Escalation
//!
//! A `file_read`/`file_write` call whose primary target matches a credential
//! pattern is escalated to `credential_access` so that policy rules can key
//! on the category alone. Memory-path hits never escalate; they only feed
//! the sensitivity alerts emitted by the governance facade.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands embedded as targets are truncated to this many characters.
const MAX_COMMAND_TARGET_CHARS: usize = 80;

/// Parameter keys probed, in order, for the primary target.
const PRIMARY_TARGET_KEYS: &[&str] = &["file_path", "path", "pattern", "command", "url"];

/// Parameter keys treated as direct path-like values for secondary targets.
const PATH_PARAM_KEYS: &[&str] = &["file_path", "path", "notebook_path"];

/// Coarse category of a tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ToolCategory {
    /// Reading files or searching their contents.
    FileRead,
    /// Creating or mutating files.
    FileWrite,
    /// A file operation that touches a credential-bearing path.
    CredentialAccess,
    /// Shell command execution.
    Command,
    /// Outbound network access.
    Network,
    /// Spawning sub-agents.
    Delegation,
    /// Agent-internal state management.
    State,
    /// Calls routed through an MCP server.
    Mcp,
    /// Anything the classifier does not recognize.
    Unknown,
}

impl ToolCategory {
    /// Returns the wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileRead => "file_read",
            Self::FileWrite => "file_write",
            Self::CredentialAccess => "credential_access",
            Self::Command => "command",
            Self::Network => "network",
            Self::Delegation => "delegation",
            Self::State => "state",
            Self::Mcp => "mcp",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ToolCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// The (possibly escalated) category.
    pub category: ToolCategory,
    /// The primary target, if any parameter yielded one.
    pub target: Option<String>,
    /// Deduplicated secondary targets. Empty when they would only repeat
    /// the primary target.
    pub targets: Vec<String>,
    /// Targets that matched a credential pattern.
    pub credential_paths: Vec<String>,
    /// Targets that matched an agent-memory pattern.
    pub memory_paths: Vec<String>,
}

/// Maps a tool name to its base category, before escalation.
#[must_use]
pub fn base_category(tool: &str) -> ToolCategory {
    match tool {
        "Read" | "Glob" | "Grep" => ToolCategory::FileRead,
        "Write" | "Edit" | "NotebookEdit" => ToolCategory::FileWrite,
        "Bash" => ToolCategory::Command,
        "WebFetch" | "WebSearch" => ToolCategory::Network,
        "Task" => ToolCategory::Delegation,
        "TodoWrite" => ToolCategory::State,
        other if other.starts_with("mcp__") => ToolCategory::Mcp,
        _ => ToolCategory::Unknown,
    }
}

static CREDENTIAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(^|/)\.env(\.[^/]*)?$",
        r"(?i)(^|/)credentials\.[^/]*$",
        r"(?i)(^|/)secrets?\.[^/]*$",
        r"(?i)\.aws/credentials$",
        r"(?i)\.ssh/id_[^/]*$",
        r"(?i)\.ssh/known_hosts$",
        r"(?i)(^|/)\.netrc$",
        r"(?i)(^|/)\.pgpass$",
        r"(?i)(^|/)\.npmrc$",
        r"(?i)(^|/)\.pypirc$",
        r"(?i)(^|/)token[^/]*\.json$",
        r"(?i)(^|/)auth[^/]*\.json$",
        r"(?i)(^|/)apikey[^/]*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("credential pattern is valid"))
    .collect()
});

static MEMORY_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(^|/)memory\.md$",
        r"/memory/[^/]+\.md$",
        r"(?i)\.(moltbot|clawdbot|openclaw)/.*memory",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("memory pattern is valid"))
    .collect()
});

static ABSOLUTE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:^|\s)(/[^\s;|&<>'"]+)"#).expect("absolute path regex is valid")
});

static RELATIVE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\.{0,2}/[^\s;|&<>'"]+\.[A-Za-z0-9]+)"#).expect("relative path regex is valid")
});

static HOME_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(~/[^\s;|&<>'"]+)"#).expect("home path regex is valid"));

static QUOTED_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new("[\"'`]([/~][^\"'`]+)[\"'`]").expect("quoted path regex is valid")
});

/// Virtual filesystem prefixes excluded from extracted paths.
const EXCLUDED_PATH_PREFIXES: &[&str] = &["/dev/", "/proc/", "/sys/"];

/// Returns `true` if the target matches a credential-bearing path pattern.
#[must_use]
pub fn is_credential_path(target: &str) -> bool {
    CREDENTIAL_PATTERNS.iter().any(|re| re.is_match(target))
}

/// Returns `true` if the target matches an agent-memory path pattern.
#[must_use]
pub fn is_memory_path(target: &str) -> bool {
    MEMORY_PATTERNS.iter().any(|re| re.is_match(target))
}

/// Extracts the primary target from a parameter bag.
///
/// The first of `file_path`, `path`, `pattern`, `command`, `url` present as
/// a string wins. Commands are truncated to 80 characters with a trailing
/// ellipsis so they stay readable in rule patterns and audit lines.
#[must_use]
pub fn primary_target(params: &Value) -> Option<String> {
    let map = params.as_object()?;
    for key in PRIMARY_TARGET_KEYS {
        if let Some(value) = map.get(*key).and_then(Value::as_str) {
            if *key == "command" {
                return Some(truncate_command(value));
            }
            return Some(value.to_string());
        }
    }
    None
}

fn truncate_command(command: &str) -> String {
    if command.chars().count() <= MAX_COMMAND_TARGET_CHARS {
        command.to_string()
    } else {
        let mut truncated: String = command.chars().take(MAX_COMMAND_TARGET_CHARS).collect();
        truncated.push('…');
        truncated
    }
}

fn push_unique(targets: &mut Vec<String>, candidate: &str) {
    if EXCLUDED_PATH_PREFIXES.iter().any(|p| candidate.starts_with(p)) {
        return;
    }
    if !targets.iter().any(|t| t == candidate) {
        targets.push(candidate.to_string());
    }
}

/// Extracts filesystem paths embedded in free text (a shell command or a
/// sub-agent prompt).
fn extract_text_paths(text: &str, include_quoted: bool, out: &mut Vec<String>) {
    for caps in ABSOLUTE_PATH_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push_unique(out, m.as_str());
        }
    }
    for caps in RELATIVE_PATH_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push_unique(out, m.as_str());
        }
    }
    for caps in HOME_PATH_RE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            push_unique(out, m.as_str());
        }
    }
    if include_quoted {
        for caps in QUOTED_PATH_RE.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                push_unique(out, m.as_str());
            }
        }
    }
}

/// Collects the secondary target list for a call.
fn secondary_targets(tool: &str, params: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let Some(map) = params.as_object() else {
        return out;
    };

    for key in PATH_PARAM_KEYS {
        if let Some(value) = map.get(*key).and_then(Value::as_str) {
            push_unique(&mut out, value);
        }
    }

    if tool == "Bash" {
        if let Some(command) = map.get("command").and_then(Value::as_str) {
            extract_text_paths(command, false, &mut out);
        }
    }
    if tool == "Task" {
        if let Some(prompt) = map.get("prompt").and_then(Value::as_str) {
            extract_text_paths(prompt, true, &mut out);
        }
    }

    out
}

/// Classifies one tool call.
///
/// Produces the category (with credential escalation applied), the primary
/// and secondary targets, and the sensitivity hits used for alerting.
#[must_use]
pub fn classify(tool: &str, params: &Value) -> Classification {
    let base = base_category(tool);
    let target = primary_target(params);
    let mut targets = secondary_targets(tool, params);

    // Drop the secondary list when it only restates the primary target.
    if let Some(primary) = &target {
        if targets.len() == 1 && targets[0] == *primary {
            targets.clear();
        }
    }

    let mut scan: Vec<&String> = Vec::new();
    if let Some(primary) = &target {
        scan.push(primary);
    }
    scan.extend(targets.iter());

    let mut credential_paths = Vec::new();
    let mut memory_paths = Vec::new();
    for candidate in scan {
        if is_credential_path(candidate) && !credential_paths.contains(candidate) {
            credential_paths.push(candidate.clone());
        }
        if is_memory_path(candidate) && !memory_paths.contains(candidate) {
            memory_paths.push(candidate.clone());
        }
    }

    let escalate = matches!(base, ToolCategory::FileRead | ToolCategory::FileWrite)
        && target.as_deref().is_some_and(is_credential_path);
    let category = if escalate {
        ToolCategory::CredentialAccess
    } else {
        base
    };

    Classification {
        category,
        target,
        targets,
        credential_paths,
        memory_paths,
    }
}
