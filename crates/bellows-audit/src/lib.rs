//! Append-only audit trail.
//!
//! Every completed transport operation appends one [`AuditRecord`] through
//! an [`AuditSink`]. Appends are best-effort: a failing sink logs a warning
//! and the operation that produced the record still succeeds. The sink must
//! therefore never be awaited on a path that gates the client response.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;

use bellows_records::RecordStore;
use bellows_types::{AuditAction, AuditRecord};

/// Maximum records the in-memory sink retains.
const MAX_ENTRIES: usize = 100_000;

/// Errors raised by audit sinks.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The backing store refused the append.
    #[error("audit append failed: {0}")]
    Append(String),
}

/// Result type for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;

/// Write-only audit record storage.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record. Ids are assigned by the sink.
    async fn append(&self, record: AuditRecord) -> Result<AuditRecord>;
}

/// Append a record, swallowing failures with a logged warning.
pub async fn emit(sink: &dyn AuditSink, record: AuditRecord) {
    let action = record.action;
    if let Err(e) = sink.append(record).await {
        tracing::warn!(action = %action, error = %e, "dropping audit record");
    }
}

/// Bounded in-memory sink; the default when no record store is persisted,
/// and the test fake everywhere.
pub struct MemoryAuditSink {
    entries: RwLock<VecDeque<AuditRecord>>,
    next_id: AtomicU64,
}

impl MemoryAuditSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// All retained records, oldest first.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.entries.read().iter().cloned().collect()
    }

    /// Retained records with the given action.
    pub fn records_for(&self, action: AuditAction) -> Vec<AuditRecord> {
        self.entries
            .read()
            .iter()
            .filter(|r| r.action == action)
            .cloned()
            .collect()
    }

    /// Number of retained records.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the sink holds no records.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, mut record: AuditRecord) -> Result<AuditRecord> {
        record.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.write();
        if entries.len() >= MAX_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(record.clone());
        Ok(record)
    }
}

/// Sink that appends into the record store's persistence layer.
pub struct RecordsAuditSink {
    records: RecordStore,
}

impl RecordsAuditSink {
    /// Create a sink over the given records.
    pub fn new(records: RecordStore) -> Self {
        Self { records }
    }
}

#[async_trait]
impl AuditSink for RecordsAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<AuditRecord> {
        self.records
            .append_audit(record)
            .map_err(|e| AuditError::Append(e.to_string()))
    }
}

/// A shared sink handle.
pub type SharedSink = Arc<dyn AuditSink>;
