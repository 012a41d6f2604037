//! Append-only, hash-linked, signed session logs.
//!
//! One chain per session, stored as JSONL: one [`AuditRecord`] per line.
//! Each record's `provenance.prevRecordHash` is the truncated SHA-256 of
//! the previous line exactly as written to disk; the first record links to
//! the literal [`GENESIS_HASH`]. Records are signed over their serialization
//! with the signature fields absent.
//!
//! # Determinism Contract
//!
//! Two different byte strings are hashed and they must never be mixed:
//!
//! - the **chain link** covers the on-disk line (signature included), so
//!   verification rehashes raw lines without re-serializing
//! - the **signature** covers the unsigned serialization, reproduced on
//!   verify by parsing the line and re-serializing under the fixed
//!   field-order contract of [`AuditRecord`]
//!
//! # Failure Model
//!
//! Appending raises on I/O failure — a silently lost record is worse than a
//! loud error. Verification never raises: it returns a [`VerifyReport`]
//! collecting every chain break, parse failure, and bad signature.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::record::{AuditRecord, R6Request, RecordResult, RecordStatus};
use crate::classifier::ToolCategory;
use crate::crypto::{SessionSigner, short_hash, verify_signature};
use crate::matcher::glob_match;

/// Previous-record hash of a session's first record.
pub const GENESIS_HASH: &str = "genesis";

/// Errors from chain operations that mutate or read the log.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ChainError {
    /// I/O failure opening, reading, or appending the log.
    #[error("audit log I/O error at {path}: {source}")]
    Io {
        /// The log file path.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },

    /// A record could not be serialized.
    #[error("audit record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Signature tallies from a verification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureStats {
    /// Records carrying a signature.
    pub signed: u64,
    /// Signatures checked against a supplied key and found valid.
    pub verified: u64,
    /// Signatures checked and found invalid.
    pub invalid: u64,
    /// Signatures present but no key was supplied for their key id.
    pub unverified: u64,
}

/// Outcome of verifying a session log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyReport {
    /// `true` iff no errors were collected.
    pub valid: bool,
    /// Number of lines examined.
    pub record_count: u64,
    /// Human-readable findings, one per defect.
    pub errors: Vec<String>,
    /// Signature tallies.
    pub signature_stats: SignatureStats,
}

/// Query criteria for [`filter_records`].
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// Exact tool name.
    pub tool: Option<String>,
    /// Exact category.
    pub category: Option<ToolCategory>,
    /// Result status.
    pub status: Option<RecordStatus>,
    /// Glob over the primary target.
    pub target: Option<String>,
    /// ISO-8601 instant or relative `N(s|m|h|d)` lower bound.
    pub since: Option<String>,
}

impl FilterCriteria {
    fn matches(&self, record: &AuditRecord, cutoff: Option<DateTime<Utc>>) -> bool {
        if let Some(tool) = &self.tool {
            if record.tool != *tool {
                return false;
            }
        }
        if let Some(category) = self.category {
            if record.category != category {
                return false;
            }
        }
        if let Some(status) = self.status {
            if record.result.status != status {
                return false;
            }
        }
        if let Some(pattern) = &self.target {
            match &record.target {
                Some(target) => {
                    if !glob_match(pattern, target) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        if let Some(cutoff) = cutoff {
            if record.timestamp < cutoff {
                return false;
            }
        }
        true
    }
}

struct ChainInner {
    writer: BufWriter<File>,
    prev_hash: String,
    record_count: u64,
}

/// An open, appendable session chain.
pub struct AuditChain {
    path: PathBuf,
    signer: Option<SessionSigner>,
    inner: Mutex<ChainInner>,
}

impl AuditChain {
    /// Opens (or creates) the chain at `path`.
    ///
    /// When the log already exists, the tail line is rehashed so new
    /// records continue the existing chain.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Io`] if the log cannot be read or opened for
    /// append.
    pub fn open(path: impl Into<PathBuf>, signer: Option<SessionSigner>) -> Result<Self, ChainError> {
        let path = path.into();

        let (prev_hash, record_count) = if path.exists() {
            let mut last_line: Option<String> = None;
            let mut count = 0u64;
            for line in read_lines(&path)? {
                let line = line.map_err(|source| ChainError::Io {
                    path: path.clone(),
                    source,
                })?;
                if !line.trim().is_empty() {
                    count += 1;
                    last_line = Some(line);
                }
            }
            (
                last_line.map_or_else(|| GENESIS_HASH.to_string(), |l| short_hash(l.as_bytes())),
                count,
            )
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ChainError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            (GENESIS_HASH.to_string(), 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| ChainError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            signer,
            inner: Mutex::new(ChainInner {
                writer: BufWriter::new(file),
                prev_hash,
                record_count,
            }),
        })
    }

    /// Records one call: assembles the record, signs it, appends it, and
    /// advances the chain head.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError`] if serialization or the append fails. On
    /// failure nothing is committed and the chain head is unchanged.
    pub fn record(&self, r6: &R6Request, result: RecordResult) -> Result<AuditRecord, ChainError> {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let mut record = AuditRecord::from_r6(r6, result, inner.prev_hash.clone());
        if let Some(signer) = &self.signer {
            let unsigned = record.unsigned_line()?;
            record.signature = Some(signer.sign_hex(unsigned.as_bytes()));
            record.signing_key_id = Some(signer.key_id());
        }

        let line = serde_json::to_string(&record)?;
        writeln!(inner.writer, "{line}").map_err(|source| ChainError::Io {
            path: self.path.clone(),
            source,
        })?;
        inner.writer.flush().map_err(|source| ChainError::Io {
            path: self.path.clone(),
            source,
        })?;

        inner.prev_hash = short_hash(line.as_bytes());
        inner.record_count += 1;

        tracing::debug!(
            record_id = %record.record_id,
            action_index = record.provenance.action_index,
            path = %self.path.display(),
            "audit record appended"
        );
        Ok(record)
    }

    /// Current chain head: the hash the next record will link to.
    #[must_use]
    pub fn prev_hash(&self) -> String {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .prev_hash
            .clone()
    }

    /// Number of records appended so far (including pre-existing lines).
    #[must_use]
    pub fn record_count(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .record_count
    }

    /// Log file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verifies this chain's log file. See [`verify_log`].
    #[must_use]
    pub fn verify(&self, public_keys: &HashMap<String, String>) -> VerifyReport {
        verify_log(&self.path, public_keys)
    }
}

/// Streams a session log and checks chain links and signatures.
///
/// `public_keys` maps short key ids to hex public keys; signatures whose
/// key id is absent are tallied as `unverified` rather than failed. A
/// missing log file verifies as an empty, valid chain. The pass is
/// diagnostic and idempotent: every defect is collected, nothing raises.
#[must_use]
pub fn verify_log(path: &Path, public_keys: &HashMap<String, String>) -> VerifyReport {
    let mut report = VerifyReport {
        valid: true,
        ..VerifyReport::default()
    };

    let lines = match read_lines(path) {
        Ok(lines) => lines,
        Err(ChainError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
            return report;
        }
        Err(error) => {
            report.errors.push(format!("log unreadable: {error}"));
            report.valid = false;
            return report;
        }
    };

    let mut expected = GENESIS_HASH.to_string();
    let mut index = 0u64;

    for line in lines {
        let Ok(line) = line else {
            report.errors.push(format!("record {index}: unreadable line"));
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<AuditRecord>(&line) {
            Ok(record) => {
                if record.provenance.prev_record_hash != expected {
                    report.errors.push(format!(
                        "record {index}: prev-hash mismatch: expected {expected}, found {}",
                        record.provenance.prev_record_hash
                    ));
                }
                if record.provenance.action_index != index {
                    report.errors.push(format!(
                        "record {index}: action index {} breaks density",
                        record.provenance.action_index
                    ));
                }
                if let Some(signature) = &record.signature {
                    report.signature_stats.signed += 1;
                    let key_id = record.signing_key_id.as_deref().unwrap_or("");
                    match public_keys.get(key_id) {
                        Some(public_key) => match record.unsigned_line() {
                            Ok(unsigned)
                                if verify_signature(
                                    public_key,
                                    unsigned.as_bytes(),
                                    signature,
                                ) =>
                            {
                                report.signature_stats.verified += 1;
                            }
                            _ => {
                                report.signature_stats.invalid += 1;
                                report
                                    .errors
                                    .push(format!("record {index}: invalid signature"));
                            }
                        },
                        None => report.signature_stats.unverified += 1,
                    }
                }
            }
            Err(error) => {
                report
                    .errors
                    .push(format!("record {index}: parse error: {error}"));
            }
        }

        // The chain link always covers the raw line bytes, parseable or not.
        expected = short_hash(line.as_bytes());
        index += 1;
    }

    report.record_count = index;
    report.valid = report.errors.is_empty();
    report
}

/// Reads every record from a session log, oldest first.
///
/// Malformed lines are skipped with a warning — queries should not be
/// blocked by a tampered line; [`verify_log`] is the diagnostic path.
///
/// # Errors
///
/// Returns [`ChainError::Io`] if the file cannot be read.
pub fn read_records(path: &Path) -> Result<Vec<AuditRecord>, ChainError> {
    let mut records = Vec::new();
    for (i, line) in read_lines(path)?.enumerate() {
        let line = line.map_err(|source| ChainError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(error) => {
                tracing::warn!(line = i, %error, path = %path.display(), "skipping malformed audit line");
            }
        }
    }
    Ok(records)
}

/// Loads and filters a session log.
///
/// # Errors
///
/// Returns [`ChainError::Io`] if the file cannot be read.
pub fn filter_records(path: &Path, criteria: &FilterCriteria) -> Result<Vec<AuditRecord>, ChainError> {
    let cutoff = criteria
        .since
        .as_deref()
        .and_then(|s| parse_since(s, Utc::now()));
    let mut records = read_records(path)?;
    records.retain(|r| criteria.matches(r, cutoff));
    Ok(records)
}

/// Returns the last `n` records of a session log.
///
/// # Errors
///
/// Returns [`ChainError::Io`] if the file cannot be read.
pub fn last_n(path: &Path, n: usize) -> Result<Vec<AuditRecord>, ChainError> {
    let records = read_records(path)?;
    let skip = records.len().saturating_sub(n);
    Ok(records.into_iter().skip(skip).collect())
}

/// Summary statistics over a session log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainStats {
    /// Number of parseable records.
    pub record_count: u64,
    /// Timestamp of the first record.
    pub first_timestamp: Option<DateTime<Utc>>,
    /// Timestamp of the last record.
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Record counts per result status.
    pub status_counts: std::collections::BTreeMap<String, u64>,
}

/// Computes summary statistics for a session log.
///
/// # Errors
///
/// Returns [`ChainError::Io`] if the file cannot be read.
pub fn chain_stats(path: &Path) -> Result<ChainStats, ChainError> {
    let records = read_records(path)?;
    let mut stats = ChainStats {
        record_count: records.len() as u64,
        first_timestamp: records.first().map(|r| r.timestamp),
        last_timestamp: records.last().map(|r| r.timestamp),
        status_counts: std::collections::BTreeMap::new(),
    };
    for record in &records {
        *stats
            .status_counts
            .entry(record.result.status.as_str().to_string())
            .or_insert(0) += 1;
    }
    Ok(stats)
}

/// Parses a `since` bound: an RFC 3339 instant, or a relative offset
/// `N(s|m|h|d)` meaning `now - N` units.
#[must_use]
pub fn parse_since(input: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(input) {
        return Some(instant.with_timezone(&Utc));
    }
    let (digits, unit) = input.split_at(input.len().checked_sub(1)?);
    let n: i64 = digits.parse().ok()?;
    let seconds = match unit {
        "s" => n,
        "m" => n * 60,
        "h" => n * 3600,
        "d" => n * 86_400,
        _ => return None,
    };
    Some(now - chrono::Duration::seconds(seconds))
}

fn read_lines(path: &Path) -> Result<std::io::Lines<BufReader<File>>, ChainError> {
    let file = File::open(path).map_err(|source| ChainError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file).lines())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::TempDir;

    use super::super::record::R6Builder;
    use super::*;

    fn record_calls(chain: &AuditChain, session: &str, n: u64) -> Vec<AuditRecord> {
        (0..n)
            .map(|i| {
                let r6 = R6Builder::new(session, "Bash", ToolCategory::Command)
                    .with_chain(i, if i == 0 { String::new() } else { format!("r6:{i:08}") })
                    .with_targets(Some(format!("echo {i}")), Vec::new())
                    .build();
                chain
                    .record(&r6, RecordResult::success(Some("ok"), Some(3)))
                    .unwrap()
            })
            .collect()
    }

    fn keys_of(signer: &SessionSigner) -> HashMap<String, String> {
        HashMap::from([(signer.key_id(), signer.public_key_hex())])
    }

    // =========================================================================
    // Chain linking
    // =========================================================================

    #[test]
    fn first_record_links_to_genesis() {
        let dir = TempDir::new().unwrap();
        let chain = AuditChain::open(dir.path().join("s.jsonl"), None).unwrap();
        let records = record_calls(&chain, "s", 1);
        assert_eq!(records[0].provenance.prev_record_hash, GENESIS_HASH);
    }

    #[test]
    fn each_record_links_to_the_previous_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let chain = AuditChain::open(&path, None).unwrap();
        record_calls(&chain, "s", 3);

        let raw = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines.len(), 3);
        for i in 1..lines.len() {
            let record: AuditRecord = serde_json::from_str(lines[i]).unwrap();
            assert_eq!(
                record.provenance.prev_record_hash,
                short_hash(lines[i - 1].as_bytes()),
            );
        }
    }

    #[test]
    fn reopening_continues_the_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        {
            let chain = AuditChain::open(&path, None).unwrap();
            record_calls(&chain, "s", 2);
        }
        {
            let chain = AuditChain::open(&path, None).unwrap();
            assert_eq!(chain.record_count(), 2);
            let r6 = R6Builder::new("s", "Read", ToolCategory::FileRead)
                .with_chain(2, "r6:00000001")
                .build();
            chain.record(&r6, RecordResult::success(None, None)).unwrap();
        }

        let report = verify_log(&path, &HashMap::new());
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.record_count, 3);
    }

    // =========================================================================
    // Signing and verification
    // =========================================================================

    #[test]
    fn signed_chain_verifies_with_the_public_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let signer = SessionSigner::generate();
        let keys = keys_of(&signer);

        let chain = AuditChain::open(&path, Some(signer)).unwrap();
        record_calls(&chain, "s", 10);

        let report = chain.verify(&keys);
        assert!(report.valid, "errors: {:?}", report.errors);
        assert_eq!(report.record_count, 10);
        assert_eq!(report.signature_stats.signed, 10);
        assert_eq!(report.signature_stats.verified, 10);
        assert_eq!(report.signature_stats.invalid, 0);
        assert_eq!(report.signature_stats.unverified, 0);
    }

    #[test]
    fn missing_key_counts_as_unverified() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let chain = AuditChain::open(&path, Some(SessionSigner::generate())).unwrap();
        record_calls(&chain, "s", 2);

        let report = verify_log(&path, &HashMap::new());
        assert!(report.valid);
        assert_eq!(report.signature_stats.signed, 2);
        assert_eq!(report.signature_stats.unverified, 2);
        assert_eq!(report.signature_stats.verified, 0);
    }

    #[test]
    fn tampering_with_a_record_is_detected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let signer = SessionSigner::generate();
        let keys = keys_of(&signer);
        let chain = AuditChain::open(&path, Some(signer)).unwrap();
        record_calls(&chain, "s", 10);

        // Flip part of record 5's target.
        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = raw.lines().map(String::from).collect();
        lines[5] = lines[5].replace("echo 5", "echo X");
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let report = verify_log(&path, &keys);
        assert!(!report.valid);
        // Either the signature on 5 fails or the link into 6 breaks — the
        // mutation must surface at one of the two.
        assert!(
            report
                .errors
                .iter()
                .any(|e| e.starts_with("record 5") || e.starts_with("record 6")),
            "errors: {:?}",
            report.errors
        );
    }

    #[test]
    fn deleting_a_middle_record_breaks_the_chain() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let chain = AuditChain::open(&path, None).unwrap();
        record_calls(&chain, "s", 4);

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = raw.lines().map(String::from).collect();
        lines.remove(1);
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let report = verify_log(&path, &HashMap::new());
        assert!(!report.valid);
    }

    #[test]
    fn verify_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let signer = SessionSigner::generate();
        let keys = keys_of(&signer);
        let chain = AuditChain::open(&path, Some(signer)).unwrap();
        record_calls(&chain, "s", 5);

        let first = verify_log(&path, &keys);
        let second = verify_log(&path, &keys);
        assert_eq!(first, second);
    }

    #[test]
    fn verify_of_missing_log_is_empty_and_valid() {
        let dir = TempDir::new().unwrap();
        let report = verify_log(&dir.path().join("absent.jsonl"), &HashMap::new());
        assert!(report.valid);
        assert_eq!(report.record_count, 0);
    }

    #[test]
    fn unparseable_line_is_reported_and_chain_continues() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let chain = AuditChain::open(&path, None).unwrap();
        record_calls(&chain, "s", 2);

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = raw.lines().map(String::from).collect();
        lines[0] = "{garbage".to_string();
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let report = verify_log(&path, &HashMap::new());
        assert!(!report.valid);
        assert!(report.errors.iter().any(|e| e.contains("parse error")));
        // Record 1 is also flagged: its stored link no longer matches the
        // rewritten line 0.
        assert!(report.errors.iter().any(|e| e.starts_with("record 1")));
    }

    // =========================================================================
    // Queries
    // =========================================================================

    #[test]
    fn filter_by_status_and_tool() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let chain = AuditChain::open(&path, None).unwrap();

        let r6 = R6Builder::new("s", "Bash", ToolCategory::Command)
            .with_chain(0, "")
            .with_targets(Some("rm -rf /".to_string()), Vec::new())
            .build();
        chain.record(&r6, RecordResult::blocked()).unwrap();
        let r6 = R6Builder::new("s", "Read", ToolCategory::FileRead)
            .with_chain(1, "r6:x")
            .with_targets(Some("/src/lib.rs".to_string()), Vec::new())
            .build();
        chain.record(&r6, RecordResult::success(None, None)).unwrap();

        let blocked = filter_records(
            &path,
            &FilterCriteria {
                status: Some(RecordStatus::Blocked),
                ..FilterCriteria::default()
            },
        )
        .unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].tool, "Bash");

        let reads = filter_records(
            &path,
            &FilterCriteria {
                tool: Some("Read".to_string()),
                target: Some("/src/*.rs".to_string()),
                ..FilterCriteria::default()
            },
        )
        .unwrap();
        assert_eq!(reads.len(), 1);
    }

    #[test]
    fn last_n_returns_the_tail() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let chain = AuditChain::open(&path, None).unwrap();
        record_calls(&chain, "s", 5);

        let tail = last_n(&path, 2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].provenance.action_index, 3);
        assert_eq!(tail[1].provenance.action_index, 4);

        assert_eq!(last_n(&path, 100).unwrap().len(), 5);
    }

    #[test]
    fn stats_tally_statuses() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s.jsonl");
        let chain = AuditChain::open(&path, None).unwrap();
        record_calls(&chain, "s", 3);

        let stats = chain_stats(&path).unwrap();
        assert_eq!(stats.record_count, 3);
        assert_eq!(stats.status_counts.get("success"), Some(&3));
        assert!(stats.first_timestamp.is_some());
    }

    #[test]
    fn parse_since_accepts_both_forms() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 12, 0, 0).unwrap();

        let absolute = parse_since("2026-03-01T00:00:00Z", now).unwrap();
        assert_eq!(absolute, Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap());

        assert_eq!(parse_since("90s", now).unwrap(), now - chrono::Duration::seconds(90));
        assert_eq!(parse_since("15m", now).unwrap(), now - chrono::Duration::minutes(15));
        assert_eq!(parse_since("2h", now).unwrap(), now - chrono::Duration::hours(2));
        assert_eq!(parse_since("7d", now).unwrap(), now - chrono::Duration::days(7));

        assert!(parse_since("yesterday", now).is_none());
        assert!(parse_since("", now).is_none());
    }
}
