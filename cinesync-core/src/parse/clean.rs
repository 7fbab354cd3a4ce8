//! Title cleaning and release-token extraction.

use cinesync_model::{Edition, ExternalId, QualityInfo, ResolutionTag};
use once_cell::sync::Lazy;
use regex::Regex;

static BRACKETED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\[[^\]]*\]|\{[^}]*\}")
        .expect("bracket regex should compile")
});

// Everything from the first quality/format token onwards is release noise.
static QUALITY_CUTOFF_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s._\-(\[])(?:blu-?ray|bdrip|brrip|webrip|web-?dl|hdtv|sdtv|pdtv|dvdrip|dvdscr|dvd[59r]?|hdrip|hdcam|xvid|divx|[xh]\.?26[45]|hevc|avc|10-?bit|hdr10|hdr|dolby[\s._-]?vision|ac3|aac|dts|flac|truehd|atmos|remux|proper|repack|\d{3,4}[pi]|4k|uhd)(?:[\s._\-)\]]|$).*$",
    )
    .expect("quality cutoff regex should compile")
});

static EDITION_CUTOFF_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s._\-(\[])(?:unrated|extended|director'?s?[\s._-]*cut|theatrical|special[\s._-]*edition|ultimate[\s._-]*edition|collector'?s?[\s._-]*edition|final[\s._-]*cut|remastered|imax|uncut)(?:[\s._\-)\]]|$).*$",
    )
    .expect("edition cutoff regex should compile")
});

static EXTERNAL_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)[\[{]((?:tmdb|imdb|tvdb)(?:id)?[-=][a-z0-9]+)[\]}]")
        .expect("external id regex should compile")
});

static RELEASE_GROUP_SUFFIX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"-([A-Za-z0-9]+)$")
        .expect("release group regex should compile")
});

static LEADING_GROUP_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\[([^\]]+)\]")
        .expect("leading group regex should compile")
});

static COLLAPSE_WHITESPACE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex should compile"));

static RESOLUTION_PATTERNS: Lazy<Vec<(ResolutionTag, Regex)>> = Lazy::new(|| {
    [
        (ResolutionTag::Uhd2160, r"2160p|4k|uhd"),
        (ResolutionTag::Fhd1080, r"1080[pi]"),
        (ResolutionTag::Hd720, r"720p"),
        (ResolutionTag::Sd576, r"576[pi]"),
        (ResolutionTag::Sd480, r"480[pi]"),
    ]
    .into_iter()
    .map(|(tag, pattern)| {
        let regex = Regex::new(&format!(
            r"(?i)(?:^|[^a-z0-9])(?:{pattern})(?:[^a-z0-9]|$)"
        ))
        .expect("resolution regex should compile");
        (tag, regex)
    })
    .collect()
});

static DVD_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])(?:dvd[59r]?|dvdrip|video_ts)(?:[^a-z0-9]|$)")
        .expect("dvd regex should compile")
});

static REMUX_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])remux(?:[^a-z0-9]|$)")
        .expect("remux regex should compile")
});

const SOURCES: &[(&str, &str)] = &[
    ("blu-?ray", "BluRay"),
    ("bdrip", "BDRip"),
    ("brrip", "BRRip"),
    ("web-?dl", "WEB-DL"),
    ("webrip", "WEBRip"),
    ("hdtv", "HDTV"),
    ("sdtv", "SDTV"),
    ("dvdrip", "DVDRip"),
    ("hdrip", "HDRip"),
    ("hdcam", "HDCAM"),
];

static SOURCE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    SOURCES
        .iter()
        .map(|(pattern, label)| {
            let regex = Regex::new(&format!(
                r"(?i)(?:^|[^a-z0-9])(?:{pattern})(?:[^a-z0-9]|$)"
            ))
            .expect("source regex should compile");
            (regex, *label)
        })
        .collect()
});

static EDITION_PATTERNS: Lazy<Vec<(Edition, Regex)>> = Lazy::new(|| {
    [
        (Edition::DirectorsCut, r"director'?s?[\s._-]*cut"),
        (Edition::FinalCut, r"final[\s._-]*cut"),
        (Edition::Ultimate, r"ultimate[\s._-]*edition"),
        (Edition::Collectors, r"collector'?s?[\s._-]*edition"),
        (Edition::Special, r"special[\s._-]*edition"),
        (Edition::Extended, r"extended"),
        (Edition::Unrated, r"unrated"),
        (Edition::Theatrical, r"theatrical"),
        (Edition::Remastered, r"remastered"),
        (Edition::Imax, r"imax"),
    ]
    .into_iter()
    .map(|(edition, pattern)| {
        let regex = Regex::new(&format!(
            r"(?i)(?:^|[^a-z0-9])(?:{pattern})(?:[^a-z0-9]|$)"
        ))
        .expect("edition regex should compile");
        (edition, regex)
    })
    .collect()
});

/// Strip release noise from a raw title fragment and normalize separators.
pub fn clean_title(raw: &str) -> String {
    let mut cleaned = BRACKETED_REGEX.replace_all(raw, " ").to_string();
    cleaned = QUALITY_CUTOFF_REGEX.replace(&cleaned, "").to_string();
    cleaned = EDITION_CUTOFF_REGEX.replace(&cleaned, "").to_string();
    cleaned = cleaned.replace(['(', ')'], " ");
    cleaned = cleaned.replace(['.', '_'], " ");
    collapse_whitespace(&cleaned)
        .trim_matches(|c: char| {
            c.is_whitespace() || c == '-' || c == '_' || c == '.' || c == ','
        })
        .to_string()
}

/// Prefix of `text` before the first quality/format token.
pub fn before_release_noise(text: &str) -> &str {
    match QUALITY_CUTOFF_REGEX.find(text) {
        Some(found) => &text[..found.start()],
        None => text,
    }
}

pub fn collapse_whitespace(value: &str) -> String {
    COLLAPSE_WHITESPACE_REGEX
        .replace_all(value.trim(), " ")
        .to_string()
}

/// True when the cleaned title carries at least one alphanumeric char.
pub fn has_title_signal(title: &str) -> bool {
    title.chars().any(char::is_alphanumeric)
}

/// Four-digit year tokens (1900-2100) with their byte offsets.
pub fn year_tokens(text: &str) -> Vec<(usize, u16)> {
    let mut out = Vec::new();
    let mut start = None;
    for (idx, ch) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
        if ch.is_alphanumeric() {
            if start.is_none() {
                start = Some(idx);
            }
            continue;
        }
        if let Some(token_start) = start.take() {
            let token = &text[token_start..idx];
            if token.len() == 4
                && token.bytes().all(|b| b.is_ascii_digit())
                && let Ok(year) = token.parse::<u16>()
                && (1900..=2100).contains(&year)
            {
                out.push((token_start, year));
            }
        }
    }
    out
}

/// Split a fragment into the part that precedes its release year and the
/// year itself.
///
/// A year in parentheses wins over bare year tokens. A year token at the very
/// start is treated as part of the title (`2012`, `1917`), so a later token
/// is preferred when one exists.
pub fn split_title_year(text: &str) -> (&str, Option<u16>) {
    let tokens = year_tokens(text);
    let bytes = text.as_bytes();

    let parenthesized = tokens.iter().rev().find(|(start, _)| {
        *start > 0
            && bytes.get(start - 1) == Some(&b'(')
            && bytes.get(start + 4) == Some(&b')')
    });
    if let Some((start, year)) = parenthesized
        && has_title_signal(&text[..*start])
    {
        return (&text[..*start], Some(*year));
    }

    let trailing = tokens
        .iter()
        .rev()
        .find(|(start, _)| *start > 0 && has_title_signal(&text[..*start]));
    match trailing {
        Some((start, year)) => (&text[..*start], Some(*year)),
        None => (text, None),
    }
}

pub fn extract_quality(texts: &[&str]) -> QualityInfo {
    let mut quality = QualityInfo::default();
    for text in texts {
        if quality.resolution.is_none() {
            quality.resolution = RESOLUTION_PATTERNS
                .iter()
                .find(|(_, regex)| regex.is_match(text))
                .map(|(tag, _)| *tag);
        }
        if quality.source.is_none() {
            quality.source = SOURCE_PATTERNS
                .iter()
                .find(|(regex, _)| regex.is_match(text))
                .map(|(_, label)| label.to_string());
        }
        quality.remux |= REMUX_REGEX.is_match(text);
    }
    if quality.resolution.is_none()
        && texts.iter().any(|text| DVD_REGEX.is_match(text))
    {
        quality.resolution = Some(ResolutionTag::Dvd);
    }
    if quality.source.is_none() && quality.remux {
        quality.source = Some("Remux".into());
    }
    quality
}

pub fn extract_edition(texts: &[&str]) -> Option<Edition> {
    texts.iter().find_map(|text| {
        EDITION_PATTERNS
            .iter()
            .find(|(_, regex)| regex.is_match(text))
            .map(|(edition, _)| *edition)
    })
}

/// First well-formed `{tmdb-123}` / `[imdbid-tt123]` style hint.
pub fn extract_external_id(texts: &[&str]) -> Option<ExternalId> {
    texts.iter().find_map(|text| {
        EXTERNAL_ID_REGEX
            .captures_iter(text)
            .find_map(|caps| caps[1].parse::<ExternalId>().ok())
    })
}

/// Fansub-style `[Group]` prefix.
pub fn leading_group(stem: &str) -> Option<String> {
    LEADING_GROUP_REGEX
        .captures(stem)
        .map(|caps| caps[1].trim().to_string())
        .filter(|group| !group.is_empty())
}

/// `-GROUP` suffix, only trusted when release noise precedes it.
pub fn release_group_suffix(stem: &str) -> Option<String> {
    if !QUALITY_CUTOFF_REGEX.is_match(stem) {
        return None;
    }
    RELEASE_GROUP_SUFFIX_REGEX
        .captures(stem)
        .map(|caps| caps[1].to_string())
        .filter(|group| {
            !RESOLUTION_PATTERNS
                .iter()
                .any(|(_, regex)| regex.is_match(group))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_release_noise() {
        assert_eq!(
            clean_title("The.Matrix.1080p.BluRay.x264-GROUP"),
            "The Matrix"
        );
        assert_eq!(clean_title("Blade Runner Final Cut"), "Blade Runner");
        assert_eq!(clean_title("[Group] Show_Name "), "Show Name");
        // tokens embedded in words are not noise
        assert_eq!(clean_title("Robots"), "Robots");
        assert_eq!(
            before_release_noise("Heat.1995.720p.BluRay"),
            "Heat.1995"
        );
    }

    #[test]
    fn prefers_parenthesized_year() {
        assert_eq!(
            split_title_year("2001 A Space Odyssey (1968)"),
            ("2001 A Space Odyssey (", Some(1968))
        );
        assert_eq!(split_title_year("1917.2019."), ("1917.", Some(2019)));
        assert_eq!(split_title_year("2012"), ("2012", None));
    }

    #[test]
    fn extracts_quality_tokens() {
        let quality = extract_quality(&["Movie.2019.2160p.UHD.BluRay.REMUX"]);
        assert_eq!(quality.resolution, Some(ResolutionTag::Uhd2160));
        assert!(quality.remux);
        assert_eq!(quality.source.as_deref(), Some("BluRay"));

        let dvd = extract_quality(&["Old.Movie.DVDRip.XviD"]);
        assert_eq!(dvd.resolution, Some(ResolutionTag::Dvd));
        assert_eq!(dvd.source.as_deref(), Some("DVDRip"));
    }

    #[test]
    fn finds_external_id_hints() {
        let id = extract_external_id(&["Heat (1995) {tmdb-949}"]).unwrap();
        assert_eq!(id, ExternalId::tmdb(949));
        assert!(extract_external_id(&["Heat (1995) {tmdb-abc}"]).is_none());
    }

    #[test]
    fn release_group_needs_noise() {
        assert_eq!(
            release_group_suffix("Movie.2019.1080p.WEB-DL-NTb").as_deref(),
            Some("NTb")
        );
        assert_eq!(release_group_suffix("Spider-Man"), None);
    }
}
