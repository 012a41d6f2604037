//! Policy-entity witnessing ledger.
//!
//! Append-only JSONL file recording each activation of a policy bundle, so
//! that the `policyEntityId` in any audit record can be resolved back to a
//! named, versioned bundle even after configs change on disk. Witnessing is
//! best-effort: a failure to witness never blocks governance.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One witnessing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessEntry {
    /// The content-addressed policy entity identifier.
    pub policy_entity_id: String,
    /// Bundle name.
    pub name: String,
    /// Bundle version.
    pub version: String,
    /// When the bundle was activated.
    pub timestamp: DateTime<Utc>,
}

/// Appends a witnessing entry, best-effort.
pub(crate) fn witness_policy(path: &Path, entity_id: &str, name: &str, version: &str) {
    let entry = WitnessEntry {
        policy_entity_id: entity_id.to_string(),
        name: name.to_string(),
        version: version.to_string(),
        timestamp: Utc::now(),
    };
    let Ok(line) = serde_json::to_string(&entry) else {
        return;
    };
    let appended = (|| -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        writeln!(file, "{line}")
    })();
    if let Err(error) = appended {
        tracing::warn!(path = %path.display(), %error, "policy witnessing failed");
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn witnessing_appends_entries() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("witnesses.jsonl");

        witness_policy(&path, "policy:safety:1:abc", "safety", "1");
        witness_policy(&path, "policy:strict:1:def", "strict", "1");

        let raw = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<WitnessEntry> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "safety");
        assert_eq!(entries[1].policy_entity_id, "policy:strict:1:def");
    }
}
