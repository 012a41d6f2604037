//! Real-time JSONL event stream.
//!
//! A side-channel, orthogonal to the audit log, for operators tailing what
//! the governance layer is deciding right now. Events are single JSON
//! lines; fields that are unset are stripped rather than written as null.
//!
//! # Best-Effort Semantics
//!
//! Emission never raises and never blocks governance: write failures are
//! logged and swallowed, rotation failures are swallowed (losing a rotation
//! beats blocking a decision), and subscriber panics are isolated. The
//! audit chain — not this stream — is the durable record.
//!
//! # Rotation
//!
//! Before each write the file size is checked; at 100 MiB the file is
//! renamed to `<path>.1` (replacing any previous backup) and a fresh file
//! is started. At most one backup is kept.

use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classifier::ToolCategory;
use crate::policy::Decision;

/// Default rotation threshold: 100 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Event severity, ordered `debug < info < warn < alert < error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Diagnostic chatter.
    Debug,
    /// Routine operation.
    Info,
    /// Needs attention eventually.
    Warn,
    /// Needs attention now: sensitive access, blocked actions.
    Alert,
    /// Something in the governance layer itself failed.
    Error,
}

/// Event types emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum EventType {
    /// First call seen for a session.
    SessionStart,
    /// Session explicitly ended by the host.
    SessionEnd,
    /// A tool call was proposed.
    ToolCall,
    /// A tool call completed.
    ToolResult,
    /// The policy engine rendered a decision.
    PolicyDecision,
    /// An enforced deny blocked a call.
    PolicyViolation,
    /// A rate-limit clause fired.
    RateLimitExceeded,
    /// An audit record was appended.
    AuditRecord,
    /// A sensitivity or blocked-action alert.
    AuditAlert,
    /// Internal failure of a governance component.
    SystemError,
}

/// One event line. Unset fields are omitted from the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// Emission time, UTC.
    pub timestamp: DateTime<Utc>,
    /// Severity for filtering.
    pub severity: Severity,
    /// Session the event belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Acting agent, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    /// Tool name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Primary target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Classified category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<ToolCategory>,
    /// Policy decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<Decision>,
    /// Human-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Rule that produced the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Call duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Generic counter (e.g. in-window rate count).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,
    /// Error message for failure events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Error classification for failure events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    /// Free-form extra context.
    #[serde(default, skip_serializing_if = "metadata_is_empty")]
    pub metadata: Option<Value>,
}

fn metadata_is_empty(metadata: &Option<Value>) -> bool {
    match metadata {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

impl Event {
    /// Creates an event stamped now, with all optional fields unset.
    #[must_use]
    pub fn new(event_type: EventType, severity: Severity) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            severity,
            session_id: None,
            agent_id: None,
            tool: None,
            target: None,
            category: None,
            decision: None,
            reason: None,
            rule_id: None,
            duration_ms: None,
            count: None,
            error: None,
            error_type: None,
            metadata: None,
        }
    }

    /// Sets the session id.
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Sets the agent id.
    #[must_use]
    pub fn with_agent(mut self, agent_id: Option<String>) -> Self {
        self.agent_id = agent_id;
        self
    }

    /// Sets the tool name.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    /// Sets the target.
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Sets the category.
    #[must_use]
    pub const fn with_category(mut self, category: ToolCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Sets the decision.
    #[must_use]
    pub const fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Sets the reason.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Sets the rule id.
    #[must_use]
    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    /// Sets the duration.
    #[must_use]
    pub const fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Sets the counter.
    #[must_use]
    pub const fn with_count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets the error fields.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>, error_type: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.error_type = Some(error_type.into());
        self
    }

    /// Sets the metadata.
    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// JSONL file path.
    pub path: PathBuf,
    /// Events below this severity are dropped.
    pub min_severity: Severity,
    /// Rotation threshold in bytes.
    pub max_bytes: u64,
}

impl StreamConfig {
    /// Config with default filtering (`info`) and rotation (100 MiB).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            min_severity: Severity::Info,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    /// Sets the minimum severity.
    #[must_use]
    pub const fn with_min_severity(mut self, min_severity: Severity) -> Self {
        self.min_severity = min_severity;
        self
    }

    /// Sets the rotation threshold.
    #[must_use]
    pub const fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

type Subscriber = Arc<dyn Fn(&Event) + Send + Sync>;

/// Append-only JSONL event emitter with size-based rotation.
pub struct EventStream {
    config: StreamConfig,
    write_lock: Mutex<()>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventStream {
    /// Creates a stream. The file is created lazily on first emit.
    #[must_use]
    pub fn new(config: StreamConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers an in-process subscriber. Subscriber panics are caught and
    /// logged; they never propagate into governance.
    pub fn subscribe(&self, subscriber: impl Fn(&Event) + Send + Sync + 'static) {
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Arc::new(subscriber));
    }

    /// Emits one event, best-effort.
    ///
    /// Applies the severity filter, rotates if the file has grown past the
    /// threshold, appends the JSON line, then invokes subscribers (outside
    /// any lock).
    pub fn emit(&self, event: &Event) {
        if event.severity < self.config.min_severity {
            return;
        }

        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(error) => {
                tracing::warn!(%error, "event serialization failed, dropping event");
                return;
            }
        };

        {
            let _guard = self
                .write_lock
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            self.rotate_if_needed();
            if let Err(error) = self.append_line(&line) {
                tracing::warn!(
                    path = %self.config.path.display(),
                    %error,
                    "event stream append failed"
                );
            }
        }

        // Snapshot subscribers so no lock is held across user code.
        let subscribers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone();
        for subscriber in subscribers {
            if catch_unwind(AssertUnwindSafe(|| subscriber(event))).is_err() {
                tracing::warn!("event subscriber panicked");
            }
        }
    }

    /// Stream file path.
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.config.path
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.config.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.config.path)?;
        writeln!(file, "{line}")?;
        file.flush()
    }

    fn rotate_if_needed(&self) {
        let Ok(metadata) = fs::metadata(&self.config.path) else {
            return;
        };
        if metadata.len() < self.config.max_bytes {
            return;
        }
        let backup = PathBuf::from(format!("{}.1", self.config.path.display()));
        let _ = fs::remove_file(&backup);
        if let Err(error) = fs::rename(&self.config.path, &backup) {
            // Rotation is best-effort; a raced or failed rename just means
            // the next emit tries again.
            tracing::debug!(%error, "event stream rotation failed");
        }
    }
}
