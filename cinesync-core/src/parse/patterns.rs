//! Declarative pattern table for episode detection.
//!
//! Entries are tried in order; the first match wins. More specific patterns
//! (multi-episode, explicit season+episode) sit above looser ones so that a
//! bare episode number never shadows a full marker.

use once_cell::sync::Lazy;
use regex::Regex;

/// How the captures of a pattern are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternKind {
    /// season, first episode, last episode
    MultiEpisode,
    /// season, episode
    SeasonEpisode,
    /// year, month, day
    DateYmd,
    /// day, month, year
    DateDmy,
    /// absolute episode number, only honored for anime-like paths
    Absolute,
}

#[derive(Debug)]
pub struct EpisodePattern {
    pub name: &'static str,
    pub kind: PatternKind,
    pub regex: Regex,
}

const TABLE: &[(&str, PatternKind, &str)] = &[
    (
        "multi_episode_concat",
        PatternKind::MultiEpisode,
        r"(?i)(?:^|[^a-z0-9])s(\d{1,3})[\s._]?e(\d{1,4})[\s._]?-?[\s._]?e(\d{1,4})(?:[^0-9]|$)",
    ),
    (
        "multi_episode_range",
        PatternKind::MultiEpisode,
        r"(?i)(?:^|[^a-z0-9])s(\d{1,3})[\s._]?e(\d{1,4})-(\d{1,3})(?:[^0-9a-z]|$)",
    ),
    (
        "multi_episode_x",
        PatternKind::MultiEpisode,
        r"(?i)(?:^|[^a-z0-9])(\d{1,2})x(\d{2,3})-(?:\d{1,2}x)?(\d{2,3})(?:[^0-9a-z]|$)",
    ),
    (
        "s00e00",
        PatternKind::SeasonEpisode,
        r"(?i)(?:^|[^a-z0-9])s(\d{1,3})[\s._]?e(\d{1,4})(?:[^0-9]|$)",
    ),
    (
        "0x00",
        PatternKind::SeasonEpisode,
        r"(?i)(?:^|[^a-z0-9])(\d{1,2})x(\d{2,3})(?:[^0-9a-z]|$)",
    ),
    (
        "season_episode_words",
        PatternKind::SeasonEpisode,
        r"(?i)(?:^|[^a-z0-9])season[\s._-]*(\d{1,3})[\s._-]*episode[\s._-]*(\d{1,4})(?:[^0-9]|$)",
    ),
    (
        "date_ymd",
        PatternKind::DateYmd,
        r"(?:^|[^0-9])((?:19|20)\d{2})[-._ ](\d{2})[-._ ](\d{2})(?:[^0-9]|$)",
    ),
    (
        "date_dmy",
        PatternKind::DateDmy,
        r"(?:^|[^0-9])(\d{2})[-._ ](\d{2})[-._ ]((?:19|20)\d{2})(?:[^0-9]|$)",
    ),
    (
        "anime_dash_number",
        PatternKind::Absolute,
        r"(?i)\s-\s+(\d{1,4})(?:v\d)?(?:\s|$|\[|\()",
    ),
    (
        "anime_ep_number",
        PatternKind::Absolute,
        r"(?i)(?:^|[^a-z0-9])(?:ep|episode)[\s._]?(\d{1,4})(?:[^0-9]|$)",
    ),
];

pub static EPISODE_PATTERNS: Lazy<Vec<EpisodePattern>> = Lazy::new(|| {
    TABLE
        .iter()
        .map(|(name, kind, pattern)| EpisodePattern {
            name,
            kind: *kind,
            regex: Regex::new(pattern).expect("episode pattern should compile"),
        })
        .collect()
});

/// Episode-only markers used when the season comes from the folder.
pub static FOLDER_EPISODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:^|[^a-z0-9])(?:e|ep|episode)[\s._]?(\d{1,4})(?:[^0-9]|$)",
        r"^\s*(\d{1,3})\s*[-_.\s]",
        r"^\s*(\d{1,3})\s*$",
    ]
    .into_iter()
    .map(|pattern| {
        Regex::new(pattern).expect("folder episode pattern should compile")
    })
    .collect()
});

static SEASON_FOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:season|series|s)[\s._-]*(\d{1,4})$")
        .expect("season folder regex should compile")
});

static SPECIALS_FOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^specials?$").expect("specials regex should compile")
});

/// Season number encoded by a folder name (`Season 1`, `S02`, `Series 3`,
/// `Specials` as season 0).
pub fn season_from_folder(name: &str) -> Option<u16> {
    let trimmed = name.trim();
    if SPECIALS_FOLDER_REGEX.is_match(trimmed) {
        return Some(0);
    }
    SEASON_FOLDER_REGEX
        .captures(trimmed)
        .and_then(|caps| caps[1].parse().ok())
}
