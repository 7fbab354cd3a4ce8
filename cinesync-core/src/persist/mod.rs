//! Durable state: processing records, link records and the broken-link
//! audit log.
//!
//! Reads go straight to a [`RecordStore`]. Writes are funnelled through the
//! [`BatchWriter`], which groups them into transactions and throttles the
//! rate at which they reach the database.

pub mod memory;
pub mod sqlite;
pub mod writer;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use cinesync_model::{
    BrokenLinkEntry, ProcessingRecord, ProcessingStage, SymlinkRecord,
};
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use writer::{BatchWriter, WriterConfig, WriterStats};

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt row for {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Persistence writer is closed")]
    Closed,
}

impl PersistenceError {
    pub(crate) fn corrupt(key: impl Into<String>, reason: impl fmt::Display) -> Self {
        PersistenceError::Corrupt {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/// A single queued mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    UpsertRecord(ProcessingRecord),
    UpsertLink(SymlinkRecord),
    DeleteLink(PathBuf),
    AppendAudit(BrokenLinkEntry),
}

impl WriteOp {
    /// Key used to collapse superseded writes inside one batch.
    pub fn key(&self) -> Option<(u8, &Path)> {
        match self {
            WriteOp::UpsertRecord(record) => Some((0, record.source_path.as_path())),
            WriteOp::UpsertLink(link) => Some((1, link.link_path.as_path())),
            WriteOp::DeleteLink(path) => Some((1, path.as_path())),
            WriteOp::AppendAudit(_) => None,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    /// Apply `ops` atomically and in order.
    async fn apply(&self, ops: &[WriteOp]) -> Result<()>;

    async fn load_record(&self, source: &Path) -> Result<Option<ProcessingRecord>>;

    /// All records, optionally restricted to `stages`.
    async fn load_records(
        &self,
        stages: Option<&[ProcessingStage]>,
    ) -> Result<Vec<ProcessingRecord>>;

    async fn load_links(&self) -> Result<Vec<SymlinkRecord>>;

    /// Most recent audit entries, newest first.
    async fn audit_log(&self, limit: usize) -> Result<Vec<BrokenLinkEntry>>;
}
