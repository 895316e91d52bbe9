//! Audit trail for trust boundary crossings
//!
//! Append-only: `append` is the only mutation, no update or delete exists.
//! One record is written for every terminal orchestrator state, before the
//! response is returned — audit durability takes precedence over response
//! delivery. Failed appends are buffered and re-flushed on the next append,
//! and reported on the tracing error channel.

use crate::error::{BoundaryError, ErrorKind, Result};
use crate::token::RiskLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Pipeline stage at which a terminal decision was made
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStage {
    Parser,
    Validator,
    Boundary,
    InputSandbox,
    Operation,
    ApiSandbox,
    OutputSandbox,
}

/// Terminal outcome of a crossing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Executed,
    BlockedInjection,
    BlockedPolicy,
    BlockedSandbox,
    BlockedUpstream,
    BlockedDownstream,
    AwaitingConfirmation,
    Cancelled,
}

/// One immutable audit entry. Carries an input fingerprint, never raw
/// sensitive content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Uuid,
    pub stage: AuditStage,
    /// SHA-256 prefix of the scrubbed input
    pub fingerprint: String,
    pub outcome: AuditOutcome,
    pub risk_level: RiskLevel,
    pub injection_detected: bool,
    /// Violation category that ended the request, if any
    pub violation: Option<ErrorKind>,
}

/// Durable append-only store behind the audit log. File, database, or log
/// stream implementations live outside the crate; [`MemorySink`] is the
/// built-in default.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<()>;
    fn query(&self, correlation_id: Uuid) -> Vec<AuditRecord>;
}

/// Thread-safe in-memory sink
#[derive(Default)]
pub struct MemorySink {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records in arrival order
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

impl AuditSink for MemorySink {
    fn append(&self, record: AuditRecord) -> Result<()> {
        let Ok(mut records) = self.records.write() else {
            return Err(BoundaryError::AuditWriteFailure(
                "sink lock poisoned".to_string(),
            ));
        };
        records.push(record);
        Ok(())
    }

    fn query(&self, correlation_id: Uuid) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|records| {
                records
                    .iter()
                    .filter(|r| r.correlation_id == correlation_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Append-only audit log over a pluggable sink, with an out-of-band retry
/// buffer for failed writes
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    pending: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Append a record. Previously buffered records are flushed first so
    /// per-correlation order is preserved. A failed write is buffered for
    /// the next attempt and reported as an error.
    pub fn append(&self, record: AuditRecord) -> Result<()> {
        self.flush_pending();
        match self.sink.append(record.clone()) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::error!(
                    correlation_id = %record.correlation_id,
                    error = %err,
                    "Audit write failed, buffering for retry"
                );
                if let Ok(mut pending) = self.pending.lock() {
                    pending.push(record);
                }
                Err(err)
            }
        }
    }

    /// All records for one request, in creation order
    pub fn query(&self, correlation_id: Uuid) -> Vec<AuditRecord> {
        self.sink.query(correlation_id)
    }

    /// Number of records still awaiting a successful write
    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn flush_pending(&self) {
        let Ok(mut pending) = self.pending.lock() else {
            return;
        };
        let buffered = std::mem::take(&mut *pending);
        for record in buffered {
            if let Err(err) = self.sink.append(record.clone()) {
                tracing::error!(error = %err, "Audit retry failed, keeping buffered");
                pending.push(record);
            }
        }
    }
}
