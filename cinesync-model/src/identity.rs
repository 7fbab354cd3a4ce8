use std::fmt::{self, Display, Formatter};

use chrono::NaiveDate;

use crate::media::{ExternalId, MediaKind};

/// Normalized resolution tag extracted from a release name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResolutionTag {
    Uhd2160,
    Fhd1080,
    Hd720,
    Sd576,
    Sd480,
    Dvd,
}

impl ResolutionTag {
    pub fn label(&self) -> &'static str {
        match self {
            ResolutionTag::Uhd2160 => "2160p",
            ResolutionTag::Fhd1080 => "1080p",
            ResolutionTag::Hd720 => "720p",
            ResolutionTag::Sd576 => "576p",
            ResolutionTag::Sd480 => "480p",
            ResolutionTag::Dvd => "DVD",
        }
    }
}

impl Display for ResolutionTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resolution and source signals gathered from the file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QualityInfo {
    pub resolution: Option<ResolutionTag>,
    pub remux: bool,
    /// Release source such as `BluRay`, `WEB-DL` or `HDTV`.
    pub source: Option<String>,
}

/// Edition or cut markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Edition {
    DirectorsCut,
    Extended,
    Unrated,
    Theatrical,
    Remastered,
    Imax,
    FinalCut,
    Ultimate,
    Special,
    Collectors,
}

impl Edition {
    pub fn label(&self) -> &'static str {
        match self {
            Edition::DirectorsCut => "Director's Cut",
            Edition::Extended => "Extended Edition",
            Edition::Unrated => "Unrated",
            Edition::Theatrical => "Theatrical Cut",
            Edition::Remastered => "Remastered",
            Edition::Imax => "IMAX",
            Edition::FinalCut => "Final Cut",
            Edition::Ultimate => "Ultimate Edition",
            Edition::Special => "Special Edition",
            Edition::Collectors => "Collector's Edition",
        }
    }
}

impl Display for Edition {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Content-type routing signals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContentFlags {
    pub anime: bool,
    pub kids: bool,
    pub uhd: bool,
}

/// Identity inferred from a path, before any provider lookup.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParsedIdentity {
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u16>,
    pub episode: Option<u16>,
    /// Last episode covered by a multi-episode file.
    pub end_episode: Option<u16>,
    pub absolute_episode: Option<u32>,
    /// Air date for daily shows.
    pub air_date: Option<NaiveDate>,
    pub quality: QualityInfo,
    pub edition: Option<Edition>,
    pub release_group: Option<String>,
    pub external_id: Option<ExternalId>,
    pub flags: ContentFlags,
    /// Season and episode were read from an explicit marker rather than
    /// inferred from folders or bare numbers.
    pub unambiguous: bool,
    /// Name of the pattern-table entry that matched, if any.
    pub pattern: Option<String>,
    pub extension: String,
}

impl ParsedIdentity {
    pub fn is_episode(&self) -> bool {
        self.episode.is_some() || self.air_date.is_some() || self.absolute_episode.is_some()
    }

    pub fn kind_hint(&self) -> MediaKind {
        if self.is_episode() {
            MediaKind::Tv
        } else {
            MediaKind::Movie
        }
    }

    /// True when two parses describe the same piece of media, ignoring
    /// quality/release noise. Used to decide whether a previously accepted
    /// resolution still applies.
    pub fn same_media(&self, other: &ParsedIdentity) -> bool {
        self.title.eq_ignore_ascii_case(&other.title)
            && self.year == other.year
            && self.season == other.season
            && self.episode == other.episode
            && self.end_episode == other.end_episode
            && self.air_date == other.air_date
            && self.absolute_episode == other.absolute_episode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_hint_follows_episode_signals() {
        let mut identity = ParsedIdentity {
            title: "Heat".into(),
            year: Some(1995),
            ..ParsedIdentity::default()
        };
        assert_eq!(identity.kind_hint(), MediaKind::Movie);

        identity.air_date = NaiveDate::from_ymd_opt(2024, 1, 15);
        assert_eq!(identity.kind_hint(), MediaKind::Tv);
    }

    #[test]
    fn same_media_ignores_quality() {
        let a = ParsedIdentity {
            title: "Dark".into(),
            season: Some(1),
            episode: Some(2),
            quality: QualityInfo {
                resolution: Some(ResolutionTag::Fhd1080),
                ..QualityInfo::default()
            },
            ..ParsedIdentity::default()
        };
        let mut b = a.clone();
        b.quality.resolution = Some(ResolutionTag::Hd720);
        b.title = "dark".into();
        assert!(a.same_media(&b));

        b.episode = Some(3);
        assert!(!a.same_media(&b));
    }
}
