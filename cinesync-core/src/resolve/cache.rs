use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cinesync_model::{ExternalId, MediaCandidate, MediaKind, ResolvedMedia};
use tokio::sync::RwLock;

/// Lookup key: either a title query or a provider id carried by the file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Title {
        kind: MediaKind,
        title: String,
        year: Option<u16>,
    },
    Id {
        kind: MediaKind,
        id: ExternalId,
    },
}

impl CacheKey {
    pub fn title(kind: MediaKind, title: &str, year: Option<u16>) -> Self {
        CacheKey::Title {
            kind,
            title: title.trim().to_lowercase(),
            year,
        }
    }

    pub fn id(kind: MediaKind, id: ExternalId) -> Self {
        CacheKey::Id { kind, id }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedLookup {
    Resolved(ResolvedMedia),
    Ambiguous(Vec<MediaCandidate>),
}

/// Shared resolution cache. Cloning yields another handle to the same map.
#[derive(Clone, Default)]
pub struct ResolverCache {
    entries: Arc<RwLock<HashMap<CacheKey, CachedLookup>>>,
}

impl fmt::Debug for ResolverCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ResolverCache");
        match self.entries.try_read() {
            Ok(guard) => debug.field("entries", &guard.len()),
            Err(_) => debug.field("entries", &"<locked>"),
        };
        debug.finish()
    }
}

impl ResolverCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &CacheKey) -> Option<CachedLookup> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: CacheKey, value: CachedLookup) {
        self.entries.write().await.insert(key, value);
    }

    /// Drop an entry, e.g. after the operator rejected a cached answer.
    pub async fn invalidate(&self, key: &CacheKey) {
        self.entries.write().await.remove(key);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}
