use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cinesync_model::{ProcessingRecord, ProcessingStage};
use tokio::sync::RwLock;

/// Whether the coordinator may move a record from `from` to `to`.
///
/// Self-transitions are allowed for stages that can be re-entered in place
/// (a retried resolution, a repeated conflict).
pub fn allowed(from: ProcessingStage, to: ProcessingStage) -> bool {
    use ProcessingStage::*;

    if to == Removed {
        return true;
    }
    match from {
        Discovered => matches!(to, Parsed | Skipped),
        Parsed => matches!(to, PendingResolve),
        PendingResolve => matches!(
            to,
            PendingResolve | Resolved | AwaitingDisambiguation | Failed
        ),
        AwaitingDisambiguation => matches!(to, Resolved | Skipped | Failed),
        Resolved => matches!(to, Linking),
        Linking => matches!(to, Linking | Linked | Skipped | Failed),
        Linked | Skipped | Failed | Removed => matches!(to, Discovered),
    }
}

/// Shared in-memory view of every processing record, keyed by source path.
#[derive(Clone, Default)]
pub struct RecordTable {
    inner: Arc<RwLock<HashMap<PathBuf, ProcessingRecord>>>,
}

impl fmt::Debug for RecordTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("RecordTable");
        match self.inner.try_read() {
            Ok(guard) => {
                debug.field("records", &guard.len());
            }
            Err(_) => {
                debug.field("records", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl RecordTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&self, records: impl IntoIterator<Item = ProcessingRecord>) {
        let mut guard = self.inner.write().await;
        for record in records {
            guard.insert(record.source_path.clone(), record);
        }
    }

    pub async fn get(&self, source: &Path) -> Option<ProcessingRecord> {
        self.inner.read().await.get(source).cloned()
    }

    pub async fn put(&self, record: ProcessingRecord) {
        self.inner
            .write()
            .await
            .insert(record.source_path.clone(), record);
    }

    pub async fn stage(&self, source: &Path) -> Option<ProcessingStage> {
        self.inner.read().await.get(source).map(|record| record.stage)
    }

    /// Records matching `predicate`, ordered by source path.
    pub async fn filter<F>(&self, predicate: F) -> Vec<ProcessingRecord>
    where
        F: Fn(&ProcessingRecord) -> bool,
    {
        let guard = self.inner.read().await;
        let mut out: Vec<_> = guard
            .values()
            .filter(|record| predicate(record))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.source_path.cmp(&b.source_path));
        out
    }

    /// Live (non-tombstone) records at or below `path`.
    pub async fn under(&self, path: &Path) -> Vec<ProcessingRecord> {
        self.filter(|record| !record.is_tombstone() && record.source_path.starts_with(path))
            .await
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
