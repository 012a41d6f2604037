//! Governance facade: the pre-call policy gate and post-call recorder.
//!
//! The agent host drives this layer synchronously around every tool call:
//!
//! 1. [`Governance::pre_call`] classifies the call, emits sensitivity
//!    alerts, evaluates policy, and returns a [`Verdict`] — the host blocks
//!    the call when [`Verdict::should_block`] is set.
//! 2. [`Governance::post_call`] — invoked whether the tool ran or was
//!    blocked — builds the R6 envelope, appends the signed audit record,
//!    charges admitted rate limits, advances the session state, and emits
//!    the record event.
//!
//! Within one session the host guarantees `pre_call → post_call` strict
//! sequencing; the hash chain's integrity depends on it. Sessions are
//! independent of each other.

mod witness;

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use thiserror::Error;

use crate::audit::{
    AuditChain, AuditLevel, AuditRecord, ChainError, FilterCriteria, R6Builder, R6Request,
    RecordResult, RecordStatus, VerifyReport, filter_records, last_n, verify_log,
};
use crate::classifier::{self, Classification};
use crate::crypto::SignerError;
use crate::events::{Event, EventStream, EventType, Severity, StreamConfig};
use crate::policy::{Decision, PolicyConfig, PolicyEngine, PolicyError, PolicyEvaluation};
use crate::rate_limit::RateLimiter;
use crate::session::{SessionError, SessionStore};

pub use witness::WitnessEntry;

/// Errors from governance operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GovernanceError {
    /// The policy config failed to load.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Session state could not be read or written.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The audit chain could not be opened or appended.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// Stored session key material is corrupt.
    #[error(transparent)]
    Signer(#[from] SignerError),
}

/// Facade configuration: storage root, policy, and stream settings.
#[derive(Debug, Clone)]
pub struct GovernanceConfig {
    /// Storage root for audit logs, sessions, and the event stream.
    pub root: PathBuf,
    /// Policy bundle to enforce.
    pub policy: PolicyConfig,
    /// Optional agent identity stamped into R6 roles and events.
    pub agent_id: Option<String>,
    /// Audit verbosity stamped into R6 rules.
    pub audit_level: AuditLevel,
    /// Minimum severity written to the event stream.
    pub min_severity: Severity,
}

impl GovernanceConfig {
    /// Config rooted at `root` with the given policy and defaults
    /// (`standard` audit level, `info` event filtering).
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, policy: PolicyConfig) -> Self {
        Self {
            root: root.into(),
            policy,
            agent_id: None,
            audit_level: AuditLevel::default(),
            min_severity: Severity::Info,
        }
    }

    /// The operator default root: `$HOME/.warden/governance`, or a
    /// relative `.warden/governance` when `$HOME` is unset.
    #[must_use]
    pub fn default_root() -> PathBuf {
        std::env::var_os("HOME").map_or_else(
            || PathBuf::from(".warden/governance"),
            |home| PathBuf::from(home).join(".warden/governance"),
        )
    }

    /// Sets the agent identity.
    #[must_use]
    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Sets the audit level.
    #[must_use]
    pub const fn with_audit_level(mut self, level: AuditLevel) -> Self {
        self.audit_level = level;
        self
    }

    /// Sets the event stream severity floor.
    #[must_use]
    pub const fn with_min_severity(mut self, min_severity: Severity) -> Self {
        self.min_severity = min_severity;
        self
    }

    /// Directory of per-session audit logs.
    #[must_use]
    pub fn audit_dir(&self) -> PathBuf {
        self.root.join("audit")
    }

    /// Directory of session state files.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    /// Durable rate-limit database path.
    #[must_use]
    pub fn rate_db_path(&self) -> PathBuf {
        self.root.join("data/rate-limits.db")
    }

    /// Event stream path.
    #[must_use]
    pub fn events_path(&self) -> PathBuf {
        self.root.join("events.jsonl")
    }

    /// Policy witnessing ledger path.
    #[must_use]
    pub fn witnesses_path(&self) -> PathBuf {
        self.root.join("witnesses.jsonl")
    }

    fn audit_log_path(&self, session_id: &str) -> PathBuf {
        self.audit_dir()
            .join(format!("{}.jsonl", crate::session::sanitize_id(session_id)))
    }
}

/// The decision returned to the agent host from a pre-call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Gate decision: an unenforced deny surfaces as `allow`.
    pub decision: Decision,
    /// Whether the decision is binding.
    pub enforced: bool,
    /// Reason from the matched rule.
    pub reason: Option<String>,
    /// The matched rule, when any fired.
    pub rule_id: Option<String>,
}

impl Verdict {
    /// `true` when the host must not run the tool.
    #[must_use]
    pub fn should_block(&self) -> bool {
        self.enforced && self.decision == Decision::Deny
    }
}

/// What the host observed when it ran the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The tool completed normally.
    Success {
        /// Raw output, hashed (not stored) into the record.
        output: Option<String>,
        /// Wall-clock duration.
        duration_ms: Option<u64>,
    },
    /// The tool failed.
    Error {
        /// Error message stored on the record.
        message: String,
        /// Wall-clock duration.
        duration_ms: Option<u64>,
    },
}

/// The artifacts produced by recording one call: the R6 envelope and the
/// signed record appended to the chain.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// The request envelope, carrying the policy constraints.
    pub r6: R6Request,
    /// The appended audit record.
    pub record: AuditRecord,
}

struct PendingCall {
    evaluation: PolicyEvaluation,
    classification: Classification,
}

/// The governance layer: policy gate, audit recorder, event emitter.
pub struct Governance {
    config: GovernanceConfig,
    engine: PolicyEngine,
    limiter: RateLimiter,
    sessions: SessionStore,
    stream: EventStream,
    chains: Mutex<HashMap<String, Arc<AuditChain>>>,
    pending: Mutex<HashMap<String, PendingCall>>,
}

impl Governance {
    /// Opens the governance layer: compiles the policy, opens the rate
    /// store and session store, and witnesses the active policy bundle.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Policy`] on an invalid policy config and
    /// [`GovernanceError::Session`] if the storage root cannot be created.
    pub fn open(config: GovernanceConfig) -> Result<Self, GovernanceError> {
        fs::create_dir_all(&config.root).map_err(|source| {
            GovernanceError::Session(SessionError::Io {
                path: config.root.clone(),
                source,
            })
        })?;

        let engine = PolicyEngine::new(config.policy.clone())?;
        let limiter = RateLimiter::open(&config.rate_db_path());
        let sessions = SessionStore::new(config.sessions_dir())?;
        let stream = EventStream::new(
            StreamConfig::new(config.events_path()).with_min_severity(config.min_severity),
        );

        witness::witness_policy(
            &config.witnesses_path(),
            engine.entity_id(),
            engine.name(),
            engine.version(),
        );
        tracing::info!(
            policy = engine.entity_id(),
            root = %config.root.display(),
            "governance layer open"
        );

        Ok(Self {
            config,
            engine,
            limiter,
            sessions,
            stream,
            chains: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        })
    }

    /// Renders the policy decision for a proposed tool call.
    ///
    /// Emits sensitivity alerts and the `policy_decision` event, stashes
    /// the evaluation for the matching [`post_call`](Self::post_call), and
    /// returns the verdict.
    pub fn pre_call(&self, session_id: &str, tool: &str, params: &Value) -> Verdict {
        let classification = classifier::classify(tool, params);

        if !self.sessions.exists(session_id) {
            self.stream.emit(
                &Event::new(EventType::SessionStart, Severity::Info)
                    .with_session(session_id)
                    .with_agent(self.config.agent_id.clone()),
            );
        }

        for path in &classification.credential_paths {
            self.stream.emit(
                &Event::new(EventType::AuditAlert, Severity::Alert)
                    .with_session(session_id)
                    .with_tool(tool)
                    .with_target(path.clone())
                    .with_category(classification.category)
                    .with_reason("credential-bearing path in tool input"),
            );
        }
        for path in &classification.memory_paths {
            self.stream.emit(
                &Event::new(EventType::AuditAlert, Severity::Warn)
                    .with_session(session_id)
                    .with_tool(tool)
                    .with_target(path.clone())
                    .with_category(classification.category)
                    .with_reason("agent memory path in tool input"),
            );
        }

        let evaluation = self.engine.evaluate(
            tool,
            classification.category,
            classification.target.as_deref(),
            &self.limiter,
        );

        if let Some(hit) = &evaluation.rate_limit_hit {
            self.stream.emit(
                &Event::new(EventType::RateLimitExceeded, Severity::Warn)
                    .with_session(session_id)
                    .with_tool(tool)
                    .with_rule(hit.rule_id.clone())
                    .with_count(hit.current),
            );
        }

        let severity = match evaluation.decision {
            Decision::Allow => Severity::Info,
            Decision::Warn | Decision::Deny => Severity::Warn,
        };
        let mut decision_event = Event::new(EventType::PolicyDecision, severity)
            .with_session(session_id)
            .with_tool(tool)
            .with_category(classification.category)
            .with_decision(evaluation.decision);
        if let Some(target) = &classification.target {
            decision_event = decision_event.with_target(target.clone());
        }
        if let Some(rule_id) = &evaluation.matched_rule {
            decision_event = decision_event.with_rule(rule_id.clone());
        }
        if let Some(reason) = &evaluation.reason {
            decision_event = decision_event.with_reason(reason.clone());
        }
        self.stream.emit(&decision_event);

        if evaluation.should_block() {
            self.stream.emit(
                &Event::new(EventType::PolicyViolation, Severity::Alert)
                    .with_session(session_id)
                    .with_tool(tool)
                    .with_decision(Decision::Deny)
                    .with_rule(evaluation.matched_rule.clone().unwrap_or_default()),
            );
        }

        let verdict = Verdict {
            decision: evaluation.gate_decision(),
            enforced: evaluation.enforced,
            reason: evaluation.reason.clone(),
            rule_id: evaluation.matched_rule.clone(),
        };

        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                session_id.to_string(),
                PendingCall {
                    evaluation,
                    classification,
                },
            );

        verdict
    }

    /// Records a completed (or blocked) tool call.
    ///
    /// `outcome` is `None` when the call was blocked and never ran; for a
    /// blocked pending verdict any outcome is ignored and the record is
    /// written with `status: blocked`.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError`] if session state or the audit append
    /// fails — a lost record must fail loudly.
    pub fn post_call(
        &self,
        session_id: &str,
        tool: &str,
        params: &Value,
        outcome: Option<Outcome>,
    ) -> Result<RecordedCall, GovernanceError> {
        let PendingCall {
            evaluation,
            classification,
        } = self
            .pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(session_id)
            .unwrap_or_else(|| {
                // The host skipped pre_call; classify and evaluate now so
                // the record still carries a policy binding.
                let classification = classifier::classify(tool, params);
                let evaluation = self.engine.evaluate(
                    tool,
                    classification.category,
                    classification.target.as_deref(),
                    &self.limiter,
                );
                PendingCall {
                    evaluation,
                    classification,
                }
            });

        let mut state = self
            .sessions
            .load_or_create(session_id, self.engine.entity_id())?;

        let blocked = evaluation.should_block();
        let result = if blocked {
            RecordResult::blocked()
        } else {
            match outcome {
                Some(Outcome::Success {
                    output,
                    duration_ms,
                }) => RecordResult::success(output.as_deref(), duration_ms),
                Some(Outcome::Error {
                    message,
                    duration_ms,
                }) => RecordResult::error(message, duration_ms),
                None => RecordResult::success(None, None),
            }
        };

        let r6 = R6Builder::new(session_id, tool, classification.category)
            .with_agent_id(self.config.agent_id.clone())
            .with_chain(state.action_index, state.last_r6_id.clone())
            .with_targets(
                classification.target.clone(),
                classification.targets.clone(),
            )
            .with_params(params)
            .with_audit_level(self.config.audit_level)
            .with_policy(self.engine.entity_id(), evaluation.constraints.clone())
            .with_resource(None, evaluation.decision == Decision::Warn)
            .build();

        let chain = self.chain_for(session_id, &state)?;
        let record = chain.record(&r6, result)?;

        if record.result.status != RecordStatus::Blocked {
            for key in &evaluation.pending_rate_keys {
                self.limiter.record(key);
            }
        }

        state.record_action(tool, classification.category, r6.id.clone());
        self.sessions.persist(&state)?;

        let event = if record.result.status == RecordStatus::Blocked {
            let mut event = Event::new(EventType::AuditAlert, Severity::Alert)
                .with_session(session_id)
                .with_tool(tool)
                .with_category(classification.category)
                .with_decision(Decision::Deny)
                .with_reason("call blocked by policy");
            if let Some(rule_id) = &evaluation.matched_rule {
                event = event.with_rule(rule_id.clone());
            }
            event
        } else {
            let mut event = Event::new(EventType::AuditRecord, Severity::Info)
                .with_session(session_id)
                .with_tool(tool)
                .with_category(classification.category);
            if let Some(duration) = record.result.duration_ms {
                event = event.with_duration(duration);
            }
            event
        };
        let event = match &record.target {
            Some(target) => event.with_target(target.clone()),
            None => event,
        };
        self.stream.emit(&event);

        Ok(RecordedCall { r6, record })
    }

    /// Emits `session_end` with summary counts and releases the session's
    /// in-memory handles. The on-disk log and state remain.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Session`] if existing state cannot be
    /// read.
    pub fn end_session(&self, session_id: &str) -> Result<(), GovernanceError> {
        if self.sessions.exists(session_id) {
            let state = self
                .sessions
                .load_or_create(session_id, self.engine.entity_id())?;
            self.stream.emit(
                &Event::new(EventType::SessionEnd, Severity::Info)
                    .with_session(session_id)
                    .with_agent(self.config.agent_id.clone())
                    .with_count(state.action_index)
                    .with_metadata(serde_json::json!({
                        "toolCounts": state.tool_counts,
                        "categoryCounts": state.category_counts,
                    })),
            );
        }
        self.chains
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(session_id);
        self.pending
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(session_id);
        Ok(())
    }

    /// Verifies a session's audit chain against its stored public key.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Session`] if the session state exists but
    /// cannot be read. An unknown session verifies as an empty, valid log.
    pub fn verify(&self, session_id: &str) -> Result<VerifyReport, GovernanceError> {
        let mut keys = HashMap::new();
        if self.sessions.exists(session_id) {
            let state = self
                .sessions
                .load_or_create(session_id, self.engine.entity_id())?;
            keys.insert(state.signing.key_id.clone(), state.signing.public_key.clone());
        }
        Ok(verify_log(&self.config.audit_log_path(session_id), &keys))
    }

    /// Loads and filters a session's audit records.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Chain`] on I/O failure.
    pub fn filter(
        &self,
        session_id: &str,
        criteria: &FilterCriteria,
    ) -> Result<Vec<AuditRecord>, GovernanceError> {
        let path = self.config.audit_log_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(filter_records(&path, criteria)?)
    }

    /// Returns the last `n` records of a session's log.
    ///
    /// # Errors
    ///
    /// Returns [`GovernanceError::Chain`] on I/O failure.
    pub fn last_n(&self, session_id: &str, n: usize) -> Result<Vec<AuditRecord>, GovernanceError> {
        let path = self.config.audit_log_path(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        Ok(last_n(&path, n)?)
    }

    /// The event stream, for subscribing in-process observers.
    #[must_use]
    pub fn events(&self) -> &EventStream {
        &self.stream
    }

    /// The active policy entity id.
    #[must_use]
    pub fn policy_entity_id(&self) -> &str {
        self.engine.entity_id()
    }

    /// Whether the rate-limit sink is durable.
    #[must_use]
    pub const fn rate_store_persistent(&self) -> bool {
        self.limiter.persistent()
    }

    fn chain_for(
        &self,
        session_id: &str,
        state: &crate::session::SessionState,
    ) -> Result<Arc<AuditChain>, GovernanceError> {
        let mut chains = self
            .chains
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(chain) = chains.get(session_id) {
            return Ok(Arc::clone(chain));
        }
        let signer = state.signer()?;
        let chain = Arc::new(AuditChain::open(
            self.config.audit_log_path(session_id),
            Some(signer),
        )?);
        chains.insert(session_id.to_string(), Arc::clone(&chain));
        Ok(chain)
    }
}
