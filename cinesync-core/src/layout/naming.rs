use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use cinesync_model::{Edition, ResolutionTag};

/// Replace characters that are problematic on common filesystems, collapse
/// whitespace and trim trailing dots/spaces.
pub fn sanitize(s: &str) -> String {
    let out = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => ' ',
            c if c.is_control() => ' ',
            _ => c,
        })
        .collect::<String>();
    let out = out.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = out.trim_end_matches(['.', ' ']).trim_start();
    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn title_folder_name(title: &str, year: Option<u16>) -> String {
    let name = sanitize(title);
    match year {
        Some(y) => format!("{} ({})", name, y),
        None => name,
    }
}

pub fn season_folder_name(season: u16) -> String {
    format!("Season {:02}", season)
}

fn with_extension(base: String, ext: &str) -> String {
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        base
    } else {
        format!("{}.{}", base, ext)
    }
}

pub fn movie_file_name(
    title: &str,
    year: Option<u16>,
    edition: Option<Edition>,
    resolution: Option<ResolutionTag>,
    ext: &str,
) -> String {
    let mut base = title_folder_name(title, year);
    if let Some(edition) = edition {
        base.push_str(" - ");
        base.push_str(edition.label());
    }
    if let Some(resolution) = resolution {
        base.push_str(" - ");
        base.push_str(resolution.label());
    }
    with_extension(base, ext)
}

pub fn episode_file_name(
    title: &str,
    season: u16,
    episode: u16,
    end_episode: Option<u16>,
    resolution: Option<ResolutionTag>,
    ext: &str,
) -> String {
    let mut base = format!("{} - S{:02}E{:02}", sanitize(title), season, episode);
    if let Some(end) = end_episode {
        base.push_str(&format!("-E{:02}", end));
    }
    if let Some(resolution) = resolution {
        base.push_str(" - ");
        base.push_str(resolution.label());
    }
    with_extension(base, ext)
}

pub fn daily_file_name(
    title: &str,
    air_date: NaiveDate,
    resolution: Option<ResolutionTag>,
    ext: &str,
) -> String {
    let mut base = format!("{} - {}", sanitize(title), air_date.format("%Y-%m-%d"));
    if let Some(resolution) = resolution {
        base.push_str(" - ");
        base.push_str(resolution.label());
    }
    with_extension(base, ext)
}

/// `Name.ext` → `Name - v{n}.ext` in the same folder.
pub fn version_suffix(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{} - v{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{} - v{}", stem, n),
    };
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_unsafe_characters() {
        assert_eq!(sanitize("Mission: Impossible"), "Mission Impossible");
        assert_eq!(sanitize("What If...?"), "What If");
        assert_eq!(sanitize("AC/DC  Live "), "AC DC Live");
        assert_eq!(sanitize("???"), "Unknown");
    }

    #[test]
    fn names_files() {
        assert_eq!(
            movie_file_name(
                "Blade Runner",
                Some(1982),
                Some(Edition::FinalCut),
                Some(ResolutionTag::Uhd2160),
                "mkv"
            ),
            "Blade Runner (1982) - Final Cut - 2160p.mkv"
        );
        assert_eq!(
            episode_file_name("Dark", 1, 1, Some(2), None, ".mkv"),
            "Dark - S01E01-E02.mkv"
        );
        assert_eq!(
            daily_file_name(
                "The Daily Show",
                NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                None,
                "mp4"
            ),
            "The Daily Show - 2024-01-15.mp4"
        );
    }

    #[test]
    fn version_suffixes() {
        assert_eq!(
            version_suffix(Path::new("/lib/Movies/Heat (1995)/Heat (1995).mkv"), 2),
            PathBuf::from("/lib/Movies/Heat (1995)/Heat (1995) - v2.mkv")
        );
    }
}
