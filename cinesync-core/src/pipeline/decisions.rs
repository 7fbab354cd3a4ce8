use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cinesync_model::PendingDecision;
use tokio::sync::RwLock;

/// Observer hook notified whenever a record starts waiting on the operator.
pub trait DecisionObserver: Send + Sync {
    fn on_pending(&self, decision: &PendingDecision);

    fn on_resolved(&self, _source: &Path) {}
}

/// Observer used when no operator surface is attached.
pub struct NoopDecisionObserver;

impl DecisionObserver for NoopDecisionObserver {
    fn on_pending(&self, _decision: &PendingDecision) {}
}

impl fmt::Debug for NoopDecisionObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopDecisionObserver")
    }
}

/// Pending operator decisions keyed by source path. One per source.
#[derive(Clone, Default)]
pub struct DecisionRegistry {
    pending: Arc<RwLock<HashMap<PathBuf, PendingDecision>>>,
}

impl fmt::Debug for DecisionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("DecisionRegistry");
        match self.pending.try_read() {
            Ok(guard) => {
                debug.field("pending", &guard.len());
            }
            Err(_) => {
                debug.field("pending", &"<locked>");
            }
        }
        debug.finish()
    }
}

impl DecisionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, decision: PendingDecision) {
        self.pending
            .write()
            .await
            .insert(decision.source_path.clone(), decision);
    }

    pub async fn get(&self, source: &Path) -> Option<PendingDecision> {
        self.pending.read().await.get(source).cloned()
    }

    pub async fn take(&self, source: &Path) -> Option<PendingDecision> {
        self.pending.write().await.remove(source)
    }

    /// Oldest first.
    pub async fn list(&self) -> Vec<PendingDecision> {
        let guard = self.pending.read().await;
        let mut out: Vec<_> = guard.values().cloned().collect();
        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.source_path.cmp(&b.source_path))
        });
        out
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}
