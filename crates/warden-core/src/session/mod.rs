//! Per-session identity and counters.
//!
//! A session scopes one contiguous stream of tool calls under one agent
//! identity: one audit log, one signing keypair, one action counter. The
//! [`SessionStore`] persists each session's [`SessionState`] as a single
//! JSON file, replaced atomically on every update.
//!
//! Concurrent access within a process is serialized by the store. Two
//! processes writing the same session id is an unsupported configuration:
//! last write wins and the audit chain's ordering guarantee no longer
//! holds.

mod state;
mod store;

pub use state::{SessionState, SigningIdentity};
pub use store::{SessionError, SessionStore};

pub(crate) use store::sanitize_id;
