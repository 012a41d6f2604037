//! File-backed session store.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

use super::state::SessionState;

/// Errors from loading or persisting session state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    /// I/O failure reading or writing the session file.
    #[error("session I/O error at {path}: {source}")]
    Io {
        /// The session file path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// The session file holds invalid JSON.
    #[error("corrupt session file {path}: {source}")]
    Corrupt {
        /// The session file path.
        path: PathBuf,
        /// The parser diagnostic.
        source: serde_json::Error,
    },
}

/// Stores one JSON file per session under a directory.
///
/// Updates replace the file atomically: the new state is written to a
/// temporary file in the same directory, synced, then renamed over the old
/// one. A short-lived mutex serializes writers within the process.
pub struct SessionStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl SessionStore {
    /// Opens (creating if needed) a session store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the directory cannot be created.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, SessionError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| SessionError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    /// Path of the state file for a session id.
    #[must_use]
    pub fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_id(session_id)))
    }

    /// Returns `true` if state has been persisted for the session.
    #[must_use]
    pub fn exists(&self, session_id: &str) -> bool {
        self.path_for(session_id).exists()
    }

    /// Loads the state for a session, creating and persisting a fresh one
    /// (with a newly generated keypair) if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on I/O failure or a corrupt state file.
    pub fn load_or_create(
        &self,
        session_id: &str,
        policy_entity_id: &str,
    ) -> Result<SessionState, SessionError> {
        let path = self.path_for(session_id);
        if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| SessionError::Io {
                path: path.clone(),
                source,
            })?;
            return serde_json::from_str(&raw)
                .map_err(|source| SessionError::Corrupt { path, source });
        }

        let state = SessionState::new(session_id, policy_entity_id);
        self.persist(&state)?;
        Ok(state)
    }

    /// Atomically replaces the session's state file.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the temporary file cannot be written
    /// or renamed into place.
    pub fn persist(&self, state: &SessionState) -> Result<(), SessionError> {
        let path = self.path_for(&state.session_id);
        let json = serde_json::to_string_pretty(state).map_err(|source| SessionError::Corrupt {
            path: path.clone(),
            source,
        })?;

        let _guard = self.lock.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        write_atomic(&self.dir, &path, json.as_bytes()).map_err(|source| SessionError::Io {
            path: path.clone(),
            source,
        })
    }
}

/// Writes bytes to `path` via a temporary sibling and a rename.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Maps a session id onto a safe file stem.
pub(crate) fn sanitize_id(session_id: &str) -> String {
    session_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::classifier::ToolCategory;

    #[test]
    fn first_access_creates_and_persists() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions")).unwrap();

        assert!(!store.exists("sess-1"));
        let state = store.load_or_create("sess-1", "policy:test:1:abc").unwrap();
        assert!(store.exists("sess-1"));
        assert_eq!(state.action_index, 0);
    }

    #[test]
    fn reload_preserves_keys_and_counters() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions")).unwrap();

        let mut state = store.load_or_create("sess-1", "policy:test:1:abc").unwrap();
        state.record_action("Bash", ToolCategory::Command, "r6:deadbeef".to_string());
        store.persist(&state).unwrap();

        let reloaded = store.load_or_create("sess-1", "policy:test:1:abc").unwrap();
        assert_eq!(reloaded, state);
        assert_eq!(reloaded.signing.public_key, state.signing.public_key);
    }

    #[test]
    fn persist_replaces_rather_than_appends() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions")).unwrap();

        let mut state = store.load_or_create("sess-1", "policy:test:1:abc").unwrap();
        for i in 0..5 {
            state.record_action("Read", ToolCategory::FileRead, format!("r6:{i:08}"));
            store.persist(&state).unwrap();
        }

        let raw = fs::read_to_string(store.path_for("sess-1")).unwrap();
        let parsed: SessionState = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.action_index, 5);
    }

    #[test]
    fn session_ids_are_sanitized_for_the_filesystem() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions")).unwrap();

        let state = store.load_or_create("agent/../../etc", "policy:test:1:abc").unwrap();
        assert_eq!(state.session_id, "agent/../../etc");

        let path = store.path_for("agent/../../etc");
        assert!(path.starts_with(dir.path().join("sessions")));
        assert!(!path.to_string_lossy().contains("/../"));
    }

    #[test]
    fn corrupt_state_surfaces_as_error() {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::new(dir.path().join("sessions")).unwrap();
        fs::write(store.path_for("sess-1"), "{not json").unwrap();

        assert!(matches!(
            store.load_or_create("sess-1", "p"),
            Err(SessionError::Corrupt { .. })
        ));
    }
}
