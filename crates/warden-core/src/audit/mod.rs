//! R6-structured audit chain.
//!
//! The audit layer turns every completed (or blocked) tool call into two
//! linked artifacts: the [`R6Request`] envelope describing what was asked
//! under which policy, and the signed, hash-linked [`AuditRecord`] appended
//! to the session's JSONL log. [`verify_log`] replays a log and reports
//! every chain break and signature defect without aborting.

mod chain;
mod record;

pub use chain::{
    AuditChain, ChainError, ChainStats, FilterCriteria, GENESIS_HASH, SignatureStats,
    VerifyReport, chain_stats, filter_records, last_n, parse_since, read_records, verify_log,
};
pub use record::{
    AuditLevel, AuditRecord, Provenance, R6Builder, R6Call, R6Reference, R6Request, R6Resource,
    R6Role, R6Rules, RecordResult, RecordStatus, SOFT_LCT_BINDING,
};
