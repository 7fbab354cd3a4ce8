use async_trait::async_trait;
use cinesync_model::{ExternalId, MediaCandidate, MediaKind, ResolvedMedia};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    ApiError(String),

    #[error("Server error: HTTP {0}")]
    ServerError(u16),

    #[error("Not found")]
    NotFound,

    #[error("Rate limited")]
    RateLimited,

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl ProviderError {
    /// Worth retrying after a delay: throttling, server-side failures and
    /// connection problems. Credential, not-found and malformed-response
    /// errors will not change on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::RateLimited
            | ProviderError::ServerError(_)
            | ProviderError::Timeout => true,
            ProviderError::NetworkError(err) => !err.is_decode(),
            ProviderError::ApiError(_)
            | ProviderError::NotFound
            | ProviderError::InvalidApiKey
            | ProviderError::ParseError(_) => false,
        }
    }
}

/// Remote metadata catalogue the resolver queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search_movie(
        &self,
        title: &str,
        year: Option<u16>,
    ) -> Result<Vec<MediaCandidate>, ProviderError>;

    async fn search_tv(
        &self,
        title: &str,
        year: Option<u16>,
    ) -> Result<Vec<MediaCandidate>, ProviderError>;

    /// Full metadata for a provider-native id.
    async fn details(
        &self,
        id: &ExternalId,
        kind: MediaKind,
    ) -> Result<ResolvedMedia, ProviderError>;

    /// Translate a foreign id (IMDB, TVDB) into provider-native candidates.
    async fn find_by_external_id(
        &self,
        id: &ExternalId,
    ) -> Result<Vec<MediaCandidate>, ProviderError>;
}
