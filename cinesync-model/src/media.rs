use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::error::ModelError;

/// Simple enum for the two kinds of media the organizer links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum MediaKind {
    /// Feature film
    Movie,
    /// Episodic television
    Tv,
}

impl Display for MediaKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::Tv => write!(f, "tv"),
        }
    }
}

/// External metadata databases an identity can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Provider {
    Tmdb,
    Imdb,
    Tvdb,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Tmdb => "tmdb",
            Provider::Imdb => "imdb",
            Provider::Tvdb => "tvdb",
        }
    }
}

impl Display for Provider {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tmdb" | "tmdbid" => Ok(Provider::Tmdb),
            "imdb" | "imdbid" => Ok(Provider::Imdb),
            "tvdb" | "tvdbid" => Ok(Provider::Tvdb),
            _ => Err(ModelError::InvalidExternalId(s.to_string())),
        }
    }
}

/// A provider-qualified identifier such as `tmdb-603` or `imdb-tt0133093`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExternalId {
    pub provider: Provider,
    pub value: String,
}

impl ExternalId {
    pub fn new(provider: Provider, value: impl Into<String>) -> Self {
        Self {
            provider,
            value: value.into(),
        }
    }

    pub fn tmdb(id: u64) -> Self {
        Self::new(Provider::Tmdb, id.to_string())
    }

    /// Numeric form of the id, when the provider uses numeric ids.
    pub fn numeric(&self) -> Option<u64> {
        self.value.parse().ok()
    }
}

impl Display for ExternalId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.provider, self.value)
    }
}

impl FromStr for ExternalId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, value) = s
            .split_once(['-', '='])
            .ok_or_else(|| ModelError::InvalidExternalId(s.to_string()))?;
        let provider: Provider = provider
            .trim()
            .parse()
            .map_err(|_| ModelError::InvalidExternalId(s.to_string()))?;
        let value = value.trim();

        let valid = match provider {
            Provider::Imdb => {
                value.len() > 2
                    && value
                        .get(..2)
                        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("tt"))
                    && value[2..].chars().all(|c| c.is_ascii_digit())
            }
            Provider::Tmdb | Provider::Tvdb => {
                !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
            }
        };
        if !valid {
            return Err(ModelError::InvalidExternalId(s.to_string()));
        }

        let value = if provider == Provider::Imdb {
            value.to_ascii_lowercase()
        } else {
            value.to_string()
        };
        Ok(ExternalId { provider, value })
    }
}

/// Franchise/collection a movie belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectionRef {
    pub id: u64,
    pub name: String,
}

/// One provider search hit considered during resolution.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MediaCandidate {
    pub id: ExternalId,
    pub kind: MediaKind,
    pub title: String,
    pub original_title: Option<String>,
    pub release_date: Option<NaiveDate>,
    pub popularity: f64,
    pub vote_count: u64,
    pub poster_path: Option<String>,
}

impl MediaCandidate {
    pub fn year(&self) -> Option<u16> {
        self.release_date.and_then(|d| u16::try_from(d.year()).ok())
    }
}

/// Content ratings treated as family-friendly for kids separation.
const FAMILY_RATINGS: &[&str] = &["G", "PG", "TV-Y", "TV-Y7", "TV-Y7-FV", "TV-G"];

/// External-provider identity bound to a parsed file.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResolvedMedia {
    pub id: ExternalId,
    pub kind: MediaKind,
    pub title: String,
    pub release_date: Option<NaiveDate>,
    pub content_rating: Option<String>,
    pub collection: Option<CollectionRef>,
    pub poster_path: Option<String>,
    pub backdrop_path: Option<String>,
    /// Provider metadata suggests Japanese animation.
    pub anime_hint: bool,
}

impl ResolvedMedia {
    pub fn year(&self) -> Option<u16> {
        self.release_date.and_then(|d| u16::try_from(d.year()).ok())
    }

    pub fn provider(&self) -> Provider {
        self.id.provider
    }

    pub fn is_family_rating(&self) -> bool {
        self.content_rating
            .as_deref()
            .map(str::trim)
            .is_some_and(|rating| {
                FAMILY_RATINGS
                    .iter()
                    .any(|family| family.eq_ignore_ascii_case(rating))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_external_ids() {
        let tmdb: ExternalId = "tmdb-603".parse().unwrap();
        assert_eq!(tmdb, ExternalId::tmdb(603));

        let imdb: ExternalId = "imdbid-TT0133093".parse().unwrap();
        assert_eq!(imdb.provider, Provider::Imdb);
        assert_eq!(imdb.value, "tt0133093");
        assert_eq!(imdb.to_string(), "imdb-tt0133093");

        assert!("tvdb-abc".parse::<ExternalId>().is_err());
        assert!("imdb-0133093".parse::<ExternalId>().is_err());
        assert!("plex-12".parse::<ExternalId>().is_err());
    }

    #[test]
    fn family_ratings_are_case_insensitive() {
        let mut media = ResolvedMedia {
            id: ExternalId::tmdb(1),
            kind: MediaKind::Movie,
            title: "Up".into(),
            release_date: NaiveDate::from_ymd_opt(2009, 5, 29),
            content_rating: Some("pg".into()),
            collection: None,
            poster_path: None,
            backdrop_path: None,
            anime_hint: false,
        };
        assert!(media.is_family_rating());
        assert_eq!(media.year(), Some(2009));

        media.content_rating = Some("R".into());
        assert!(!media.is_family_rating());
    }
}
