//! TMDB v3 implementation of [`MetadataProvider`] over plain `reqwest`.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDate;
use cinesync_config::ResolverConfig;
use cinesync_model::{
    CollectionRef, ExternalId, MediaCandidate, MediaKind, Provider,
    ResolvedMedia,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use url::Url;

use super::provider::{MetadataProvider, ProviderError};

const ANIMATION_GENRE_ID: u64 = 16;
const RATING_COUNTRY: &str = "US";

fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").ok()
}

fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_date))
}

#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct SearchPage<T> {
    #[serde(default)]
    results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct MovieItem {
    id: u64,
    title: String,
    #[serde(default)]
    original_title: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    release_date: Option<NaiveDate>,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    vote_count: u64,
    #[serde(default)]
    poster_path: Option<String>,
}

impl From<MovieItem> for MediaCandidate {
    fn from(item: MovieItem) -> Self {
        MediaCandidate {
            id: ExternalId::tmdb(item.id),
            kind: MediaKind::Movie,
            title: item.title,
            original_title: item.original_title,
            release_date: item.release_date,
            popularity: item.popularity,
            vote_count: item.vote_count,
            poster_path: item.poster_path,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TvItem {
    id: u64,
    name: String,
    #[serde(default)]
    original_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    first_air_date: Option<NaiveDate>,
    #[serde(default)]
    popularity: f64,
    #[serde(default)]
    vote_count: u64,
    #[serde(default)]
    poster_path: Option<String>,
}

impl From<TvItem> for MediaCandidate {
    fn from(item: TvItem) -> Self {
        MediaCandidate {
            id: ExternalId::tmdb(item.id),
            kind: MediaKind::Tv,
            title: item.name,
            original_title: item.original_name,
            release_date: item.first_air_date,
            popularity: item.popularity,
            vote_count: item.vote_count,
            poster_path: item.poster_path,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Genre {
    id: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct Collection {
    id: u64,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ReleaseDate {
    #[serde(default)]
    certification: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CountryReleaseDates {
    iso_3166_1: String,
    #[serde(default)]
    release_dates: Vec<ReleaseDate>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ReleaseDates {
    #[serde(default)]
    results: Vec<CountryReleaseDates>,
}

#[derive(Debug, Clone, Deserialize)]
struct MovieDetails {
    id: u64,
    title: String,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    release_date: Option<NaiveDate>,
    #[serde(default)]
    belongs_to_collection: Option<Collection>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    original_language: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    release_dates: ReleaseDates,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentRating {
    iso_3166_1: String,
    #[serde(default)]
    rating: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ContentRatings {
    #[serde(default)]
    results: Vec<ContentRating>,
}

#[derive(Debug, Clone, Deserialize)]
struct TvDetails {
    id: u64,
    name: String,
    #[serde(default, deserialize_with = "deserialize_optional_date")]
    first_air_date: Option<NaiveDate>,
    #[serde(default)]
    genres: Vec<Genre>,
    #[serde(default)]
    original_language: Option<String>,
    #[serde(default)]
    poster_path: Option<String>,
    #[serde(default)]
    backdrop_path: Option<String>,
    #[serde(default)]
    content_ratings: ContentRatings,
}

#[derive(Debug, Clone, Deserialize)]
struct FindResponse {
    #[serde(default)]
    movie_results: Vec<MovieItem>,
    #[serde(default)]
    tv_results: Vec<TvItem>,
}

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    api_key: &'a str,
    query: &'a str,
    language: &'a str,
    include_adult: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    year: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    first_air_date_year: Option<u16>,
}

#[derive(Debug, Serialize)]
struct DetailsQuery<'a> {
    api_key: &'a str,
    language: &'a str,
    append_to_response: &'a str,
}

#[derive(Debug, Serialize)]
struct FindQuery<'a> {
    api_key: &'a str,
    language: &'a str,
    external_source: &'a str,
}

fn anime_hint(genres: &[Genre], original_language: Option<&str>) -> bool {
    genres.iter().any(|genre| genre.id == ANIMATION_GENRE_ID)
        && original_language == Some("ja")
}

fn movie_certification(dates: &ReleaseDates) -> Option<String> {
    dates
        .results
        .iter()
        .find(|country| country.iso_3166_1 == RATING_COUNTRY)?
        .release_dates
        .iter()
        .map(|release| release.certification.trim())
        .find(|cert| !cert.is_empty())
        .map(str::to_string)
}

fn tv_rating(ratings: &ContentRatings) -> Option<String> {
    ratings
        .results
        .iter()
        .find(|rating| rating.iso_3166_1 == RATING_COUNTRY)
        .map(|rating| rating.rating.trim().to_string())
        .filter(|rating| !rating.is_empty())
}

pub struct TmdbProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: Url,
    language: String,
}

impl fmt::Debug for TmdbProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TmdbProvider")
            .field("base_url", &self.base_url.as_str())
            .field("language", &self.language)
            .finish()
    }
}

impl TmdbProvider {
    pub fn new(
        api_key: impl Into<String>,
        base_url: &str,
        language: impl Into<String>,
    ) -> Result<Self, ProviderError> {
        // `Url::join` replaces the last segment unless the base ends in '/'
        let mut base = base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url = Url::parse(&base).map_err(|err| {
            ProviderError::ApiError(format!("invalid base url {base_url}: {err}"))
        })?;

        Ok(Self {
            http: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url,
            language: language.into(),
        })
    }

    pub fn from_config(config: &ResolverConfig) -> Result<Self, ProviderError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ProviderError::InvalidApiKey)?;
        Self::new(api_key, &config.base_url, config.language.clone())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|err| ProviderError::ApiError(format!("bad endpoint {path}: {err}")))
    }

    async fn get_json<Q, T>(&self, path: &str, query: &Q) -> Result<T, ProviderError>
    where
        Q: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        debug!(target: "cinesync::resolve", %path, "tmdb request");
        let response = self.http.get(url).query(query).send().await?;

        let status = response.status();
        if status.is_success() {
            let body = response.bytes().await?;
            return serde_json::from_slice::<T>(&body)
                .map_err(|err| ProviderError::ParseError(err.to_string()));
        }

        #[derive(Debug, Deserialize)]
        struct TmdbErrorBody {
            #[serde(default)]
            status_message: Option<String>,
        }

        let message = response
            .json::<TmdbErrorBody>()
            .await
            .ok()
            .and_then(|body| body.status_message)
            .unwrap_or_else(|| format!("TMDB request failed with status {}", status));

        match status.as_u16() {
            401 => Err(ProviderError::InvalidApiKey),
            404 => Err(ProviderError::NotFound),
            429 => Err(ProviderError::RateLimited),
            code if status.is_server_error() => {
                error!(target: "cinesync::resolve", code, %message, "tmdb server error");
                Err(ProviderError::ServerError(code))
            }
            _ => Err(ProviderError::ApiError(message)),
        }
    }

    fn tmdb_id(id: &ExternalId) -> Result<u64, ProviderError> {
        if id.provider != Provider::Tmdb {
            return Err(ProviderError::ApiError(format!(
                "{id} is not a TMDB id"
            )));
        }
        id.numeric()
            .ok_or_else(|| ProviderError::ApiError(format!("{id} is not numeric")))
    }
}

#[async_trait]
impl MetadataProvider for TmdbProvider {
    async fn search_movie(
        &self,
        title: &str,
        year: Option<u16>,
    ) -> Result<Vec<MediaCandidate>, ProviderError> {
        let query = SearchQuery {
            api_key: &self.api_key,
            query: title,
            language: &self.language,
            include_adult: false,
            year,
            first_air_date_year: None,
        };
        let page: SearchPage<MovieItem> =
            self.get_json("search/movie", &query).await?;
        Ok(page.results.into_iter().map(MediaCandidate::from).collect())
    }

    async fn search_tv(
        &self,
        title: &str,
        year: Option<u16>,
    ) -> Result<Vec<MediaCandidate>, ProviderError> {
        let query = SearchQuery {
            api_key: &self.api_key,
            query: title,
            language: &self.language,
            include_adult: false,
            year: None,
            first_air_date_year: year,
        };
        let page: SearchPage<TvItem> = self.get_json("search/tv", &query).await?;
        Ok(page.results.into_iter().map(MediaCandidate::from).collect())
    }

    async fn details(
        &self,
        id: &ExternalId,
        kind: MediaKind,
    ) -> Result<ResolvedMedia, ProviderError> {
        let tmdb_id = Self::tmdb_id(id)?;
        match kind {
            MediaKind::Movie => {
                let query = DetailsQuery {
                    api_key: &self.api_key,
                    language: &self.language,
                    append_to_response: "release_dates",
                };
                let details: MovieDetails =
                    self.get_json(&format!("movie/{tmdb_id}"), &query).await?;
                Ok(ResolvedMedia {
                    id: ExternalId::tmdb(details.id),
                    kind: MediaKind::Movie,
                    content_rating: movie_certification(&details.release_dates),
                    anime_hint: anime_hint(
                        &details.genres,
                        details.original_language.as_deref(),
                    ),
                    title: details.title,
                    release_date: details.release_date,
                    collection: details.belongs_to_collection.map(|collection| {
                        CollectionRef {
                            id: collection.id,
                            name: collection.name,
                        }
                    }),
                    poster_path: details.poster_path,
                    backdrop_path: details.backdrop_path,
                })
            }
            MediaKind::Tv => {
                let query = DetailsQuery {
                    api_key: &self.api_key,
                    language: &self.language,
                    append_to_response: "content_ratings",
                };
                let details: TvDetails =
                    self.get_json(&format!("tv/{tmdb_id}"), &query).await?;
                Ok(ResolvedMedia {
                    id: ExternalId::tmdb(details.id),
                    kind: MediaKind::Tv,
                    content_rating: tv_rating(&details.content_ratings),
                    anime_hint: anime_hint(
                        &details.genres,
                        details.original_language.as_deref(),
                    ),
                    title: details.name,
                    release_date: details.first_air_date,
                    collection: None,
                    poster_path: details.poster_path,
                    backdrop_path: details.backdrop_path,
                })
            }
        }
    }

    async fn find_by_external_id(
        &self,
        id: &ExternalId,
    ) -> Result<Vec<MediaCandidate>, ProviderError> {
        let external_source = match id.provider {
            Provider::Imdb => "imdb_id",
            Provider::Tvdb => "tvdb_id",
            Provider::Tmdb => {
                return Err(ProviderError::ApiError(format!(
                    "{id} is already a TMDB id"
                )));
            }
        };
        let query = FindQuery {
            api_key: &self.api_key,
            language: &self.language,
            external_source,
        };
        let found: FindResponse =
            self.get_json(&format!("find/{}", id.value), &query).await?;

        Ok(found
            .movie_results
            .into_iter()
            .map(MediaCandidate::from)
            .chain(found.tv_results.into_iter().map(MediaCandidate::from))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_keep_the_version_segment() {
        let provider =
            TmdbProvider::new("key", "https://api.themoviedb.org/3", "en-US")
                .unwrap();
        assert_eq!(
            provider.endpoint("search/movie").unwrap().as_str(),
            "https://api.themoviedb.org/3/search/movie"
        );
    }

    #[test]
    fn missing_api_key_is_rejected() {
        let config = ResolverConfig {
            api_key: Some("  ".into()),
            ..ResolverConfig::default()
        };
        assert!(matches!(
            TmdbProvider::from_config(&config),
            Err(ProviderError::InvalidApiKey)
        ));
    }

    #[test]
    fn decodes_movie_details_with_certification() {
        let raw = r#"{
            "id": 603,
            "title": "The Matrix",
            "release_date": "1999-03-30",
            "belongs_to_collection": {"id": 2344, "name": "The Matrix Collection"},
            "genres": [{"id": 28}, {"id": 878}],
            "original_language": "en",
            "poster_path": "/p.jpg",
            "release_dates": {"results": [
                {"iso_3166_1": "DE", "release_dates": [{"certification": "16"}]},
                {"iso_3166_1": "US", "release_dates": [{"certification": ""}, {"certification": "R"}]}
            ]}
        }"#;
        let details: MovieDetails = serde_json::from_str(raw).unwrap();
        assert_eq!(movie_certification(&details.release_dates).as_deref(), Some("R"));
        assert_eq!(details.belongs_to_collection.unwrap().id, 2344);
        assert!(!anime_hint(&details.genres, details.original_language.as_deref()));
    }

    #[test]
    fn empty_dates_decode_as_none() {
        let raw = r#"{"results": [{"id": 1, "name": "Show", "first_air_date": ""}]}"#;
        let page: SearchPage<TvItem> = serde_json::from_str(raw).unwrap();
        let candidate = MediaCandidate::from(page.results[0].clone());
        assert_eq!(candidate.release_date, None);
        assert_eq!(candidate.kind, MediaKind::Tv);
    }

    #[test]
    fn anime_needs_animation_and_japanese() {
        let genres = vec![Genre { id: 16 }];
        assert!(anime_hint(&genres, Some("ja")));
        assert!(!anime_hint(&genres, Some("en")));
    }
}
