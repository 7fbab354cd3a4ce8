use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use cinesync_model::SymlinkRecord;
use dashmap::DashMap;

/// In-memory view of every link the manager owns, keyed both ways.
///
/// Cloning yields another handle to the same maps.
#[derive(Clone, Default)]
pub struct LinkIndex {
    by_link: Arc<DashMap<PathBuf, SymlinkRecord>>,
    by_source: Arc<DashMap<PathBuf, PathBuf>>,
}

impl fmt::Debug for LinkIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkIndex")
            .field("links", &self.by_link.len())
            .finish()
    }
}

impl LinkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from persisted records. Later records for the same source win.
    pub fn rebuild<I>(&self, records: I) -> usize
    where
        I: IntoIterator<Item = SymlinkRecord>,
    {
        self.by_link.clear();
        self.by_source.clear();
        for record in records {
            self.insert(record);
        }
        self.by_link.len()
    }

    /// Track `record`, replacing any previous link for the same source in
    /// the source map. The old link's record stays until removed.
    pub fn insert(&self, record: SymlinkRecord) {
        self.by_source
            .insert(record.source_path.clone(), record.link_path.clone());
        self.by_link.insert(record.link_path.clone(), record);
    }

    pub fn remove_link(&self, link: &Path) -> Option<SymlinkRecord> {
        let (_, record) = self.by_link.remove(link)?;
        self.by_source
            .remove_if(&record.source_path, |_, current| current == link);
        Some(record)
    }

    pub fn link_for_source(&self, source: &Path) -> Option<PathBuf> {
        self.by_source.get(source).map(|entry| entry.value().clone())
    }

    pub fn record(&self, link: &Path) -> Option<SymlinkRecord> {
        self.by_link.get(link).map(|entry| entry.value().clone())
    }

    pub fn contains_link(&self, link: &Path) -> bool {
        self.by_link.contains_key(link)
    }

    pub fn len(&self) -> usize {
        self.by_link.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_link.is_empty()
    }

    pub fn records(&self) -> Vec<SymlinkRecord> {
        self.by_link
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn record(link: &str, source: &str) -> SymlinkRecord {
        SymlinkRecord {
            link_path: link.into(),
            target_path: source.into(),
            source_path: source.into(),
            created_at: Utc::now(),
            last_verified_at: Utc::now(),
        }
    }

    #[test]
    fn relocation_keeps_source_pointing_at_newest_link() {
        let index = LinkIndex::new();
        index.insert(record("/lib/a.mkv", "/src/a.mkv"));
        index.insert(record("/lib/b.mkv", "/src/a.mkv"));
        assert_eq!(
            index.link_for_source(Path::new("/src/a.mkv")),
            Some(PathBuf::from("/lib/b.mkv"))
        );

        // dropping the stale link must not unmap the source
        index.remove_link(Path::new("/lib/a.mkv"));
        assert_eq!(
            index.link_for_source(Path::new("/src/a.mkv")),
            Some(PathBuf::from("/lib/b.mkv"))
        );

        index.remove_link(Path::new("/lib/b.mkv"));
        assert!(index.link_for_source(Path::new("/src/a.mkv")).is_none());
        assert!(index.is_empty());
    }
}
