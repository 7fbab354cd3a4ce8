use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use cinesync_model::{
    BrokenLinkEntry, ProcessingRecord, ProcessingStage, SymlinkRecord,
};
use tokio::sync::RwLock;

use super::{RecordStore, Result, WriteOp};

#[derive(Default)]
struct Tables {
    records: HashMap<PathBuf, ProcessingRecord>,
    links: HashMap<PathBuf, SymlinkRecord>,
    audit: Vec<BrokenLinkEntry>,
    applied_batches: usize,
}

/// Store that keeps everything in process memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("MemoryStore");
        match self.tables.try_read() {
            Ok(guard) => {
                debug
                    .field("records", &guard.records.len())
                    .field("links", &guard.links.len())
                    .field("audit", &guard.audit.len());
            }
            Err(_) => {
                debug.field("tables", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `apply` calls that reached the store.
    pub async fn applied_batches(&self) -> usize {
        self.tables.read().await.applied_batches
    }

    pub async fn record_count(&self) -> usize {
        self.tables.read().await.records.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn apply(&self, ops: &[WriteOp]) -> Result<()> {
        let mut tables = self.tables.write().await;
        for op in ops {
            match op {
                WriteOp::UpsertRecord(record) => {
                    tables
                        .records
                        .insert(record.source_path.clone(), record.clone());
                }
                WriteOp::UpsertLink(link) => {
                    tables.links.insert(link.link_path.clone(), link.clone());
                }
                WriteOp::DeleteLink(path) => {
                    tables.links.remove(path);
                }
                WriteOp::AppendAudit(entry) => tables.audit.push(entry.clone()),
            }
        }
        tables.applied_batches += 1;
        Ok(())
    }

    async fn load_record(&self, source: &Path) -> Result<Option<ProcessingRecord>> {
        Ok(self.tables.read().await.records.get(source).cloned())
    }

    async fn load_records(
        &self,
        stages: Option<&[ProcessingStage]>,
    ) -> Result<Vec<ProcessingRecord>> {
        let tables = self.tables.read().await;
        let mut records: Vec<_> = tables
            .records
            .values()
            .filter(|record| stages.is_none_or(|stages| stages.contains(&record.stage)))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        Ok(records)
    }

    async fn load_links(&self) -> Result<Vec<SymlinkRecord>> {
        let tables = self.tables.read().await;
        let mut links: Vec<_> = tables.links.values().cloned().collect();
        links.sort_by(|a, b| a.link_path.cmp(&b.link_path));
        Ok(links)
    }

    async fn audit_log(&self, limit: usize) -> Result<Vec<BrokenLinkEntry>> {
        let tables = self.tables.read().await;
        Ok(tables.audit.iter().rev().take(limit).cloned().collect())
    }
}
