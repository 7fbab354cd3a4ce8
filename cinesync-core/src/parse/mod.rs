//! Path-to-identity parsing.
//!
//! [`NameParser::parse`] is a pure function of the path string: no
//! filesystem access, no provider calls. Episode markers come from the
//! declarative table in [`patterns`]; title/year/quality helpers live in
//! [`clean`].

pub mod clean;
pub mod extras;
pub mod patterns;

use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;
use cinesync_config::{DEFAULT_VIDEO_EXTENSIONS, PathsConfig};
use cinesync_model::{ContentFlags, ParsedIdentity, ResolutionTag};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use self::patterns::{
    EPISODE_PATTERNS, FOLDER_EPISODE_PATTERNS, PatternKind, season_from_folder,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseFailure {
    #[error("no title could be inferred from {0}")]
    NoTitle(PathBuf),

    #[error("{0} is bonus material")]
    Extra(PathBuf),

    #[error("unsupported extension '{extension}'")]
    UnsupportedExtension { extension: String },

    #[error("path is not valid UTF-8: {0}")]
    NotUtf8(PathBuf),
}

static MOVIE_FOLDER_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s*\(((?:19|20)\d{2})\)")
        .expect("movie folder regex should compile")
});

static KIDS_COMPONENT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(?:kids|children|family)(?:[\s._-]?(?:movies|shows|tv|films|series))?$",
    )
    .expect("kids component regex should compile")
});

static DEFAULT_PARSER: Lazy<NameParser> = Lazy::new(NameParser::default);

/// Parse with the default video-extension allow-list.
pub fn parse(path: &Path) -> Result<ParsedIdentity, ParseFailure> {
    DEFAULT_PARSER.parse(path)
}

#[derive(Debug, Clone)]
pub struct NameParser {
    extensions: Vec<String>,
}

impl Default for NameParser {
    fn default() -> Self {
        Self::new(DEFAULT_VIDEO_EXTENSIONS.iter().copied())
    }
}

struct EpisodeMatch {
    pattern: &'static str,
    start: usize,
    season: Option<u16>,
    episode: Option<u16>,
    end_episode: Option<u16>,
    absolute: Option<u32>,
    air_date: Option<NaiveDate>,
    unambiguous: bool,
}

impl NameParser {
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { extensions }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new(&paths.video_extensions)
    }

    pub fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            })
    }

    /// Infer the identity of the file at `path`.
    ///
    /// `path` is usually relative to its source root so that folders above
    /// the library (mount points, user directories) do not leak into title
    /// or flag inference.
    pub fn parse(&self, path: &Path) -> Result<ParsedIdentity, ParseFailure> {
        let stem = path
            .file_stem()
            .map(|stem| {
                stem.to_str()
                    .ok_or_else(|| ParseFailure::NotUtf8(path.to_path_buf()))
            })
            .transpose()?
            .unwrap_or_default();
        let extension = path
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !self.extensions.iter().any(|allowed| *allowed == extension) {
            return Err(ParseFailure::UnsupportedExtension { extension });
        }

        let folders = folder_names(path)?;
        if extras::is_extra(stem, &folders) {
            return Err(ParseFailure::Extra(path.to_path_buf()));
        }

        let parent = folders.last().copied();
        let mut noise_texts = vec![stem];
        noise_texts.extend(parent);

        let leading_group = clean::leading_group(stem);
        let anime_path = leading_group.is_some()
            || folders
                .iter()
                .any(|folder| folder.to_ascii_lowercase().contains("anime"));

        let mut identity = ParsedIdentity {
            quality: clean::extract_quality(&noise_texts),
            edition: clean::extract_edition(&noise_texts),
            release_group: leading_group
                .clone()
                .or_else(|| clean::release_group_suffix(stem)),
            external_id: {
                let mut hint_texts = vec![stem];
                hint_texts.extend(folders.iter().rev());
                clean::extract_external_id(&hint_texts)
            },
            extension,
            ..ParsedIdentity::default()
        };

        if let Some(found) = match_episode(stem, anime_path) {
            apply_episode(&mut identity, &found);
            let prefix = &stem[..found.start];
            fill_episode_title(&mut identity, prefix, &folders);
        } else if let Some(season) = parent.and_then(season_from_folder)
            && let Some(episode) = folder_episode(stem)
        {
            identity.season = Some(season);
            identity.episode = Some(episode);
            identity.pattern = Some("season_folder".into());
            fill_episode_title(&mut identity, "", &folders);
        } else {
            fill_movie_title(&mut identity, stem, parent);
        }

        if !clean::has_title_signal(&identity.title) {
            return Err(ParseFailure::NoTitle(path.to_path_buf()));
        }

        identity.flags = ContentFlags {
            anime: anime_path || identity.absolute_episode.is_some(),
            kids: folders
                .iter()
                .any(|folder| KIDS_COMPONENT_REGEX.is_match(folder.trim())),
            uhd: identity.quality.resolution == Some(ResolutionTag::Uhd2160),
        };

        debug!(
            target: "cinesync::parse",
            path = %path.display(),
            title = %identity.title,
            year = ?identity.year,
            season = ?identity.season,
            episode = ?identity.episode,
            pattern = ?identity.pattern,
            "parsed identity"
        );
        Ok(identity)
    }
}

fn folder_names(path: &Path) -> Result<Vec<&str>, ParseFailure> {
    let Some(parent) = path.parent() else {
        return Ok(Vec::new());
    };
    parent
        .components()
        .filter_map(|component| match component {
            Component::Normal(name) => Some(name),
            _ => None,
        })
        .map(|name| {
            name.to_str()
                .ok_or_else(|| ParseFailure::NotUtf8(path.to_path_buf()))
        })
        .collect()
}

fn match_episode(stem: &str, anime_path: bool) -> Option<EpisodeMatch> {
    for pattern in EPISODE_PATTERNS.iter() {
        if pattern.kind == PatternKind::Absolute && !anime_path {
            continue;
        }
        for caps in pattern.regex.captures_iter(stem) {
            let start = caps.get(0).map(|m| m.start()).unwrap_or_default();
            let number = |idx: usize| -> Option<u32> {
                caps.get(idx).and_then(|m| m.as_str().parse().ok())
            };
            let found = match pattern.kind {
                PatternKind::MultiEpisode => {
                    let (Some(season), Some(first), Some(last)) =
                        (number(1), number(2), number(3))
                    else {
                        continue;
                    };
                    if last <= first {
                        continue;
                    }
                    EpisodeMatch {
                        pattern: pattern.name,
                        start,
                        season: narrow(season),
                        episode: narrow(first),
                        end_episode: narrow(last),
                        absolute: None,
                        air_date: None,
                        unambiguous: true,
                    }
                }
                PatternKind::SeasonEpisode => EpisodeMatch {
                    pattern: pattern.name,
                    start,
                    season: number(1).and_then(narrow),
                    episode: number(2).and_then(narrow),
                    end_episode: None,
                    absolute: None,
                    air_date: None,
                    unambiguous: true,
                },
                PatternKind::DateYmd | PatternKind::DateDmy => {
                    let (year, month, day) = if pattern.kind == PatternKind::DateYmd {
                        (number(1), number(2), number(3))
                    } else {
                        (number(3), number(2), number(1))
                    };
                    let Some(date) = year.zip(month).zip(day).and_then(
                        |((year, month), day)| {
                            NaiveDate::from_ymd_opt(year as i32, month, day)
                        },
                    ) else {
                        continue;
                    };
                    EpisodeMatch {
                        pattern: pattern.name,
                        start,
                        season: None,
                        episode: None,
                        end_episode: None,
                        absolute: None,
                        air_date: Some(date),
                        unambiguous: true,
                    }
                }
                PatternKind::Absolute => {
                    let Some(value) = number(1) else { continue };
                    // a bare year is not an episode number
                    if value == 0 || (1900..=2100).contains(&value) {
                        continue;
                    }
                    EpisodeMatch {
                        pattern: pattern.name,
                        start,
                        season: Some(1),
                        episode: narrow(value),
                        end_episode: None,
                        absolute: Some(value),
                        air_date: None,
                        unambiguous: false,
                    }
                }
            };
            return Some(found);
        }
    }
    None
}

fn narrow(value: u32) -> Option<u16> {
    u16::try_from(value).ok()
}

fn apply_episode(identity: &mut ParsedIdentity, found: &EpisodeMatch) {
    identity.season = found.season;
    identity.episode = found.episode;
    identity.end_episode = found.end_episode;
    identity.absolute_episode = found.absolute;
    identity.air_date = found.air_date;
    identity.unambiguous = found.unambiguous;
    identity.pattern = Some(found.pattern.to_string());
}

fn folder_episode(stem: &str) -> Option<u16> {
    FOLDER_EPISODE_PATTERNS.iter().find_map(|regex| {
        regex
            .captures(stem)
            .and_then(|caps| caps[1].parse::<u16>().ok())
    })
}

/// The folder naming the series: the one above a season folder, otherwise
/// the immediate parent.
fn series_folder<'a>(folders: &[&'a str]) -> Option<&'a str> {
    let (parent, rest) = folders.split_last()?;
    if season_from_folder(parent).is_some() {
        rest.last().copied()
    } else {
        Some(*parent)
    }
}

fn title_and_year(raw: &str) -> (String, Option<u16>) {
    let (title, year) = clean::split_title_year(clean::before_release_noise(raw));
    (clean::clean_title(title), year)
}

fn fill_episode_title(identity: &mut ParsedIdentity, prefix: &str, folders: &[&str]) {
    let (title, year) = title_and_year(prefix);
    let folder = series_folder(folders)
        .filter(|folder| !extras::is_extras_folder(folder))
        .map(title_and_year);

    if clean::has_title_signal(&title) {
        identity.title = title;
        identity.year = year;
        // a `Show (2019)` folder supplies the year a bare filename lacks
        if identity.year.is_none()
            && let Some((folder_title, folder_year)) = folder
            && folder_title.eq_ignore_ascii_case(&identity.title)
        {
            identity.year = folder_year;
        }
    } else if let Some((folder_title, folder_year)) = folder {
        identity.title = folder_title;
        identity.year = folder_year;
    }
}

fn fill_movie_title(identity: &mut ParsedIdentity, stem: &str, parent: Option<&str>) {
    if let Some(folder) = parent
        && !extras::is_extras_folder(folder)
        && let Some(caps) = MOVIE_FOLDER_REGEX.captures(folder.trim())
    {
        let title = clean::clean_title(&caps[1]);
        if clean::has_title_signal(&title) {
            identity.title = title;
            identity.year = caps[2].parse().ok();
            identity.pattern = Some("movie_folder".into());
            return;
        }
    }

    let (title, year) = title_and_year(stem);
    if clean::has_title_signal(&title) {
        identity.title = title;
        identity.year = year;
        identity.pattern = Some("movie_filename".into());
        return;
    }

    if let Some(folder) = parent.filter(|folder| !extras::is_extras_folder(folder)) {
        let (title, year) = title_and_year(folder);
        identity.title = title;
        identity.year = year;
        identity.pattern = Some("movie_folder".into());
    }
}
