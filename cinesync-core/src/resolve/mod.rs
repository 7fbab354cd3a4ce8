//! External ID resolution.
//!
//! The [`Resolver`] turns a [`ParsedIdentity`] into a provider-backed
//! [`ResolvedMedia`], a ranked list of candidates for the operator, or a
//! not-found verdict. Lookups go through the shared [`ResolverCache`] first;
//! provider calls are bounded by the [`RequestBudget`], wrapped in a per-call
//! timeout and retried with exponential backoff.

pub mod cache;
pub mod limiter;
pub mod provider;
pub mod ranking;
pub mod tmdb;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use cinesync_config::ResolverConfig;
use cinesync_model::{
    ExternalId, MediaCandidate, MediaKind, ParsedIdentity, Provider,
    ResolvedMedia,
};
use thiserror::Error;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

pub use cache::{CacheKey, CachedLookup, ResolverCache};
pub use limiter::RequestBudget;
pub use provider::{MetadataProvider, ProviderError};
pub use ranking::{Assessment, assess, rank_candidates};
pub use tmdb::TmdbProvider;

use crate::retry::Backoff;

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    Resolved(ResolvedMedia),
    /// Plausible candidates, best first. Never auto-picked.
    Ambiguous(Vec<MediaCandidate>),
    NotFound,
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("provider unavailable after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("provider rejected the lookup: {0}")]
    Rejected(#[source] ProviderError),

    #[error("resolver is shut down")]
    Closed,
}

impl ResolveError {
    /// The record should stay pending and be retried later.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ResolveError::Transient { .. })
    }
}

pub struct Resolver {
    provider: Arc<dyn MetadataProvider>,
    cache: ResolverCache,
    budget: RequestBudget,
    request_timeout: Duration,
    max_attempts: u32,
    backoff: Backoff,
    candidate_limit: usize,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("cache", &self.cache)
            .field("budget", &self.budget)
            .field("request_timeout", &self.request_timeout)
            .field("max_attempts", &self.max_attempts)
            .field("candidate_limit", &self.candidate_limit)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(
        provider: Arc<dyn MetadataProvider>,
        cache: ResolverCache,
        config: &ResolverConfig,
    ) -> Self {
        Self {
            provider,
            cache,
            budget: RequestBudget::new(
                config.max_concurrent,
                config.requests_per_second,
            ),
            request_timeout: config.request_timeout(),
            max_attempts: config.max_attempts.max(1),
            backoff: Backoff::for_requests(config),
            candidate_limit: config.candidate_limit.max(1),
        }
    }

    pub fn cache(&self) -> &ResolverCache {
        &self.cache
    }

    pub fn budget(&self) -> &RequestBudget {
        &self.budget
    }

    /// Resolve `identity` as media of `kind`.
    ///
    /// A provider id carried by the file short-circuits the title search.
    /// `Ok(NotFound)` and `Err(Rejected)` are final; `Err(Transient)` means
    /// the lookup may succeed later.
    pub async fn resolve(
        &self,
        identity: &ParsedIdentity,
        kind: MediaKind,
    ) -> Result<ResolveOutcome, ResolveError> {
        if let Some(id) = &identity.external_id {
            return self.resolve_id(id, kind).await;
        }
        self.resolve_title(&identity.title, identity.year, kind).await
    }

    /// Resolve a specific provider id, bypassing title ranking. Used for
    /// id hints in file names and for operator decisions.
    pub async fn resolve_id(
        &self,
        id: &ExternalId,
        kind: MediaKind,
    ) -> Result<ResolveOutcome, ResolveError> {
        let key = CacheKey::id(kind, id.clone());
        if let Some(CachedLookup::Resolved(media)) = self.cache.get(&key).await {
            debug!(target: "cinesync::resolve", %id, "id cache hit");
            return Ok(ResolveOutcome::Resolved(media));
        }

        let native = if id.provider == Provider::Tmdb {
            id.clone()
        } else {
            let found = match self
                .call("find", || self.provider.find_by_external_id(id))
                .await
            {
                Err(ResolveError::Rejected(ProviderError::NotFound)) => Vec::new(),
                other => other?,
            };
            let Some(candidate) = found
                .iter()
                .find(|candidate| candidate.kind == kind)
                .or_else(|| found.first())
            else {
                info!(target: "cinesync::resolve", %id, "foreign id unknown to provider");
                return Ok(ResolveOutcome::NotFound);
            };
            candidate.id.clone()
        };

        match self.fetch_details(&native, kind).await? {
            Some(media) => {
                self.cache
                    .insert(key, CachedLookup::Resolved(media.clone()))
                    .await;
                Ok(ResolveOutcome::Resolved(media))
            }
            None => Ok(ResolveOutcome::NotFound),
        }
    }

    /// Resolve an operator-chosen candidate and remember the answer for the
    /// title it was chosen for.
    pub async fn accept_candidate(
        &self,
        identity: &ParsedIdentity,
        candidate: &MediaCandidate,
    ) -> Result<ResolveOutcome, ResolveError> {
        let outcome = self.resolve_id(&candidate.id, candidate.kind).await?;
        if let ResolveOutcome::Resolved(media) = &outcome {
            self.cache
                .insert(
                    CacheKey::title(candidate.kind, &identity.title, identity.year),
                    CachedLookup::Resolved(media.clone()),
                )
                .await;
        }
        Ok(outcome)
    }

    async fn resolve_title(
        &self,
        title: &str,
        year: Option<u16>,
        kind: MediaKind,
    ) -> Result<ResolveOutcome, ResolveError> {
        let key = CacheKey::title(kind, title, year);
        match self.cache.get(&key).await {
            Some(CachedLookup::Resolved(media)) => {
                debug!(target: "cinesync::resolve", %title, "title cache hit");
                return Ok(ResolveOutcome::Resolved(media));
            }
            Some(CachedLookup::Ambiguous(candidates)) => {
                return Ok(ResolveOutcome::Ambiguous(candidates));
            }
            None => {}
        }

        let mut results = self.search(kind, title, year).await?;
        if results.is_empty() && year.is_some() {
            // folder years are often off by a release window; widen once
            results = self.search(kind, title, None).await?;
        }

        let ranked = rank_candidates(title, year, &results);
        match assess(&ranked, self.candidate_limit) {
            Assessment::Confident(candidate) => {
                debug!(
                    target: "cinesync::resolve",
                    %title,
                    id = %candidate.id,
                    "confident match"
                );
                match self.fetch_details(&candidate.id, kind).await? {
                    Some(media) => {
                        self.cache
                            .insert(key, CachedLookup::Resolved(media.clone()))
                            .await;
                        Ok(ResolveOutcome::Resolved(media))
                    }
                    None => Ok(ResolveOutcome::NotFound),
                }
            }
            Assessment::Ambiguous(candidates) => {
                info!(
                    target: "cinesync::resolve",
                    %title,
                    year = ?year,
                    candidates = candidates.len(),
                    "ambiguous match"
                );
                self.cache
                    .insert(key, CachedLookup::Ambiguous(candidates.clone()))
                    .await;
                Ok(ResolveOutcome::Ambiguous(candidates))
            }
            Assessment::NoMatch => {
                info!(target: "cinesync::resolve", %title, year = ?year, "no match");
                Ok(ResolveOutcome::NotFound)
            }
        }
    }

    async fn search(
        &self,
        kind: MediaKind,
        title: &str,
        year: Option<u16>,
    ) -> Result<Vec<MediaCandidate>, ResolveError> {
        let result = match kind {
            MediaKind::Movie => {
                self.call("search_movie", || self.provider.search_movie(title, year))
                    .await
            }
            MediaKind::Tv => {
                self.call("search_tv", || self.provider.search_tv(title, year))
                    .await
            }
        };
        match result {
            Err(ResolveError::Rejected(ProviderError::NotFound)) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn fetch_details(
        &self,
        id: &ExternalId,
        kind: MediaKind,
    ) -> Result<Option<ResolvedMedia>, ResolveError> {
        match self.call("details", || self.provider.details(id, kind)).await {
            Ok(media) => Ok(Some(media)),
            Err(ResolveError::Rejected(ProviderError::NotFound)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// One provider operation under the request budget, with timeout and
    /// bounded retries for transient failures.
    async fn call<T, F, Fut>(&self, op: &'static str, mut request: F) -> Result<T, ResolveError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let permit = self.budget.acquire().await.ok_or(ResolveError::Closed)?;
            let result = match timeout(self.request_timeout, request()).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };
            drop(permit);

            let err = match result {
                Ok(value) => return Ok(value),
                Err(err) if !err.is_transient() => {
                    return Err(ResolveError::Rejected(err));
                }
                Err(err) => err,
            };

            if attempt >= self.max_attempts {
                warn!(
                    target: "cinesync::resolve",
                    op,
                    attempts = attempt,
                    error = %err,
                    "provider call exhausted its attempts"
                );
                return Err(ResolveError::Transient {
                    attempts: attempt,
                    source: err,
                });
            }

            let delay = self.backoff.delay(op, attempt);
            debug!(
                target: "cinesync::resolve",
                op,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "retrying provider call"
            );
            sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use mockall::predicate::eq;

    use super::provider::MockMetadataProvider;
    use super::*;

    fn config() -> ResolverConfig {
        ResolverConfig {
            api_key: Some("test".into()),
            max_attempts: 2,
            backoff_base_ms: 1,
            backoff_max_ms: 2,
            requests_per_second: 1_000,
            ..ResolverConfig::default()
        }
    }

    fn candidate(id: u64, title: &str, year: i32) -> MediaCandidate {
        MediaCandidate {
            id: ExternalId::tmdb(id),
            kind: MediaKind::Movie,
            title: title.into(),
            original_title: None,
            release_date: NaiveDate::from_ymd_opt(year, 1, 1),
            popularity: 1.0,
            vote_count: 1,
            poster_path: None,
        }
    }

    fn media(id: u64, title: &str, year: i32) -> ResolvedMedia {
        ResolvedMedia {
            id: ExternalId::tmdb(id),
            kind: MediaKind::Movie,
            title: title.into(),
            release_date: NaiveDate::from_ymd_opt(year, 1, 1),
            content_rating: None,
            collection: None,
            poster_path: None,
            backdrop_path: None,
            anime_hint: false,
        }
    }

    fn identity(title: &str, year: Option<u16>) -> ParsedIdentity {
        ParsedIdentity {
            title: title.into(),
            year,
            ..ParsedIdentity::default()
        }
    }

    #[tokio::test]
    async fn confident_match_is_cached() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search_movie()
            .times(1)
            .returning(|_, _| Ok(vec![candidate(949, "Heat", 1995)]));
        provider
            .expect_details()
            .with(eq(ExternalId::tmdb(949)), eq(MediaKind::Movie))
            .times(1)
            .returning(|_, _| Ok(media(949, "Heat", 1995)));

        let resolver =
            Resolver::new(Arc::new(provider), ResolverCache::new(), &config());
        let id = identity("Heat", Some(1995));

        for _ in 0..2 {
            let outcome = resolver.resolve(&id, MediaKind::Movie).await.unwrap();
            assert_eq!(outcome, ResolveOutcome::Resolved(media(949, "Heat", 1995)));
        }
    }

    #[tokio::test]
    async fn ambiguous_results_are_returned_not_guessed() {
        let mut provider = MockMetadataProvider::new();
        provider.expect_search_movie().returning(|_, _| {
            Ok(vec![candidate(1, "Solaris", 1972), candidate(2, "Solaris", 1972)])
        });
        provider.expect_details().never();

        let resolver =
            Resolver::new(Arc::new(provider), ResolverCache::new(), &config());
        let outcome = resolver
            .resolve(&identity("Solaris", Some(1972)), MediaKind::Movie)
            .await
            .unwrap();
        assert!(matches!(outcome, ResolveOutcome::Ambiguous(ref c) if c.len() == 2));
    }

    #[tokio::test]
    async fn transient_errors_retry_then_surface() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search_movie()
            .times(2)
            .returning(|_, _| Err(ProviderError::ServerError(503)));

        let resolver =
            Resolver::new(Arc::new(provider), ResolverCache::new(), &config());
        let err = resolver
            .resolve(&identity("Heat", None), MediaKind::Movie)
            .await
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(matches!(err, ResolveError::Transient { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn bad_credentials_are_not_retried() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_search_movie()
            .times(1)
            .returning(|_, _| Err(ProviderError::InvalidApiKey));

        let resolver =
            Resolver::new(Arc::new(provider), ResolverCache::new(), &config());
        let err = resolver
            .resolve(&identity("Heat", None), MediaKind::Movie)
            .await
            .unwrap_err();
        assert!(!err.is_recoverable());
    }

    #[tokio::test]
    async fn imdb_hint_goes_through_find() {
        let mut provider = MockMetadataProvider::new();
        provider
            .expect_find_by_external_id()
            .times(1)
            .returning(|_| Ok(vec![candidate(603, "The Matrix", 1999)]));
        provider
            .expect_details()
            .with(eq(ExternalId::tmdb(603)), eq(MediaKind::Movie))
            .returning(|_, _| Ok(media(603, "The Matrix", 1999)));
        provider.expect_search_movie().never();

        let resolver =
            Resolver::new(Arc::new(provider), ResolverCache::new(), &config());
        let mut id = identity("Matrix", None);
        id.external_id = Some("imdb-tt0133093".parse().unwrap());
        let outcome = resolver.resolve(&id, MediaKind::Movie).await.unwrap();
        assert!(matches!(outcome, ResolveOutcome::Resolved(m) if m.id == ExternalId::tmdb(603)));
    }

    #[tokio::test]
    async fn empty_search_is_not_found() {
        let mut provider = MockMetadataProvider::new();
        provider.expect_search_movie().returning(|_, _| Ok(Vec::new()));

        let resolver =
            Resolver::new(Arc::new(provider), ResolverCache::new(), &config());
        let outcome = resolver
            .resolve(&identity("Nothing Here", Some(2001)), MediaKind::Movie)
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::NotFound);
    }
}
