#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::NaiveDate;
use cinesync_config::{Config, ConflictPolicy};
use cinesync_core::{
    BatchWriter, Coordinator, CoordinatorParts, MemoryStore, MetadataProvider,
    NameParser, NoopDecisionObserver, PathBuilder, ProviderError, RecordStore,
    Resolver, ResolverCache, SymlinkManager, WriterConfig,
};
use cinesync_model::{ExternalId, MediaCandidate, MediaKind, ResolvedMedia};
use tempfile::TempDir;

/// In-process catalogue standing in for the remote provider.
#[derive(Debug, Default)]
pub struct FakeProvider {
    shows: Mutex<HashMap<String, Vec<MediaCandidate>>>,
    movies: Mutex<HashMap<String, Vec<MediaCandidate>>>,
    details: Mutex<HashMap<u64, ResolvedMedia>>,
    unavailable: AtomicBool,
    calls: AtomicUsize,
}

impl FakeProvider {
    pub fn add_show(&self, id: u64, title: &str, year: i32) {
        self.add(MediaKind::Tv, id, title, year);
    }

    pub fn add_movie(&self, id: u64, title: &str, year: i32) {
        self.add(MediaKind::Movie, id, title, year);
    }

    fn add(&self, kind: MediaKind, id: u64, title: &str, year: i32) {
        let release_date = NaiveDate::from_ymd_opt(year, 1, 1);
        let candidate = MediaCandidate {
            id: ExternalId::tmdb(id),
            kind,
            title: title.into(),
            original_title: None,
            release_date,
            popularity: 10.0,
            vote_count: 100,
            poster_path: Some(format!("/{id}.jpg")),
        };
        let table = match kind {
            MediaKind::Tv => &self.shows,
            MediaKind::Movie => &self.movies,
        };
        table
            .lock()
            .unwrap()
            .entry(title.to_lowercase())
            .or_default()
            .push(candidate);
        self.details.lock().unwrap().insert(
            id,
            ResolvedMedia {
                id: ExternalId::tmdb(id),
                kind,
                title: title.into(),
                release_date,
                content_rating: None,
                collection: None,
                poster_path: None,
                backdrop_path: None,
                anime_hint: false,
            },
        );
    }

    /// Make every call fail with a server error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            Err(ProviderError::ServerError(503))
        } else {
            Ok(())
        }
    }

    fn lookup(
        table: &Mutex<HashMap<String, Vec<MediaCandidate>>>,
        title: &str,
    ) -> Vec<MediaCandidate> {
        table
            .lock()
            .unwrap()
            .get(&title.to_lowercase())
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MetadataProvider for FakeProvider {
    async fn search_movie(
        &self,
        title: &str,
        _year: Option<u16>,
    ) -> Result<Vec<MediaCandidate>, ProviderError> {
        self.enter()?;
        Ok(Self::lookup(&self.movies, title))
    }

    async fn search_tv(
        &self,
        title: &str,
        _year: Option<u16>,
    ) -> Result<Vec<MediaCandidate>, ProviderError> {
        self.enter()?;
        Ok(Self::lookup(&self.shows, title))
    }

    async fn details(
        &self,
        id: &ExternalId,
        _kind: MediaKind,
    ) -> Result<ResolvedMedia, ProviderError> {
        self.enter()?;
        id.numeric()
            .and_then(|id| self.details.lock().unwrap().get(&id).cloned())
            .ok_or(ProviderError::NotFound)
    }

    async fn find_by_external_id(
        &self,
        _id: &ExternalId,
    ) -> Result<Vec<MediaCandidate>, ProviderError> {
        self.enter()?;
        Ok(Vec::new())
    }
}

/// A coordinator over temporary source and destination roots.
pub struct Harness {
    pub dir: TempDir,
    pub config: Config,
    pub provider: Arc<FakeProvider>,
    pub store: Arc<MemoryStore>,
    pub writer: Arc<BatchWriter>,
    pub links: Arc<SymlinkManager>,
    pub coordinator: Coordinator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut Config)) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::build(tweak, store)
    }

    pub fn build(tweak: impl FnOnce(&mut Config), store: Arc<MemoryStore>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.paths.source_dirs = vec![dir.path().join("src")];
        config.paths.destination_dir = dir.path().join("library");
        config.links.conflict_policy = ConflictPolicy::Prompt;
        config.resolver.max_attempts = 1;
        config.persistence.flush_interval_ms = 10;
        tweak(&mut config);
        std::fs::create_dir_all(&config.paths.source_dirs[0]).unwrap();
        std::fs::create_dir_all(&config.paths.destination_dir).unwrap();

        let provider = Arc::new(FakeProvider::default());
        let writer = Arc::new(BatchWriter::spawn(
            Arc::clone(&store) as Arc<dyn RecordStore>,
            WriterConfig::from(&config.persistence),
        ));
        let links = Arc::new(SymlinkManager::new(
            config.destination(),
            &config.links,
        ));
        let parts = CoordinatorParts {
            parser: NameParser::from_config(&config.paths),
            resolver: Arc::new(Resolver::new(
                Arc::clone(&provider) as Arc<dyn MetadataProvider>,
                ResolverCache::new(),
                &config.resolver,
            )),
            paths: PathBuilder::new(&config),
            links: Arc::clone(&links),
            writer: Arc::clone(&writer),
            observer: Arc::new(NoopDecisionObserver),
        };
        let coordinator = Coordinator::new(&config, parts);

        Self {
            dir,
            config,
            provider,
            store,
            writer,
            links,
            coordinator,
        }
    }

    /// A second coordinator over the same roots, store and provider, with
    /// empty in-memory state, as after a restart.
    pub fn restarted(&self) -> (Coordinator, Arc<SymlinkManager>) {
        let writer = Arc::new(BatchWriter::spawn(
            Arc::clone(&self.store) as Arc<dyn RecordStore>,
            WriterConfig::from(&self.config.persistence),
        ));
        let links = Arc::new(SymlinkManager::new(
            self.config.destination(),
            &self.config.links,
        ));
        let parts = CoordinatorParts {
            parser: NameParser::from_config(&self.config.paths),
            resolver: Arc::new(Resolver::new(
                Arc::clone(&self.provider) as Arc<dyn MetadataProvider>,
                ResolverCache::new(),
                &self.config.resolver,
            )),
            paths: PathBuilder::new(&self.config),
            links: Arc::clone(&links),
            writer,
            observer: Arc::new(NoopDecisionObserver),
        };
        (Coordinator::new(&self.config, parts), links)
    }

    pub fn source_root(&self) -> PathBuf {
        self.config.paths.source_dirs[0].clone()
    }

    pub fn library(&self) -> &Path {
        self.config.destination()
    }

    /// Create a source file at `relative` below the source root.
    pub fn add_source(&self, relative: &str) -> PathBuf {
        let path = self.source_root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"video").unwrap();
        path
    }
}
