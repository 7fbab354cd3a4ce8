//! Destination path construction.
//!
//! [`PathBuilder::build`] is a pure function of the resolved media, the
//! parsed identity, the file's path under its source root and the layout
//! policy captured at construction. Policy order: content-type separation
//! picks the top-level folder, the layout mode picks normalized vs mirrored
//! structure, then resolution tiers and collection folders nest in.

pub mod naming;

use std::path::{Path, PathBuf};

use cinesync_config::{
    CollectionsConfig, Config, LayoutConfig, LayoutMode, ResolutionConfig,
    ResolutionTiers, SeparationConfig,
};
use cinesync_model::{
    DestinationPath, MediaKind, ParsedIdentity, ResolutionTag, ResolvedMedia,
};

pub use naming::{sanitize, version_suffix};

#[derive(Debug, Clone)]
pub struct PathBuilder {
    root: PathBuf,
    layout: LayoutConfig,
    separation: SeparationConfig,
    resolution: ResolutionConfig,
    collections: CollectionsConfig,
}

impl PathBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            root: config.destination().to_path_buf(),
            layout: config.layout.clone(),
            separation: config.separation.clone(),
            resolution: config.resolution.clone(),
            collections: config.collections.clone(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn build(
        &self,
        resolved: &ResolvedMedia,
        identity: &ParsedIdentity,
        source_relative: &Path,
    ) -> DestinationPath {
        let mut relative = PathBuf::from(self.content_folder(resolved, identity));

        if self.layout.mode == LayoutMode::Source {
            relative.push(source_relative);
            return DestinationPath::new(&self.root, relative);
        }

        if self.resolution.enabled {
            let tiers = match resolved.kind {
                MediaKind::Movie => &self.resolution.movie_tiers,
                MediaKind::Tv => &self.resolution.show_tiers,
            };
            let tier = tier_folder(tiers, identity);
            if !tier.trim().is_empty() {
                relative.push(naming::sanitize(tier));
            }
        }

        let original_name = source_relative
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let year = resolved.year().or(identity.year);
        let resolution_tag = identity
            .quality
            .resolution
            .filter(|_| self.layout.resolution_in_name);

        match resolved.kind {
            MediaKind::Movie => {
                if self.collections.enabled
                    && let Some(collection) = &resolved.collection
                {
                    relative.push(naming::sanitize(&collection.name));
                }
                relative.push(naming::title_folder_name(&resolved.title, year));
                if self.layout.rename_files {
                    relative.push(naming::movie_file_name(
                        &resolved.title,
                        year,
                        identity.edition,
                        resolution_tag,
                        &identity.extension,
                    ));
                } else {
                    relative.push(original_name);
                }
            }
            MediaKind::Tv => {
                relative.push(naming::title_folder_name(&resolved.title, year));
                let file_name = if let Some(date) = identity.air_date {
                    relative.push(format!("Season {}", date.format("%Y")));
                    naming::daily_file_name(
                        &resolved.title,
                        date,
                        resolution_tag,
                        &identity.extension,
                    )
                } else if let Some(episode) = identity.episode {
                    let season = identity.season.unwrap_or(1);
                    relative.push(naming::season_folder_name(season));
                    naming::episode_file_name(
                        &resolved.title,
                        season,
                        episode,
                        identity.end_episode,
                        resolution_tag,
                        &identity.extension,
                    )
                } else {
                    // no episode signal: keep the file beside the show folder
                    original_name.clone()
                };
                if self.layout.rename_files {
                    relative.push(file_name);
                } else {
                    relative.push(original_name);
                }
            }
        }

        DestinationPath::new(&self.root, relative)
    }

    fn content_folder(&self, resolved: &ResolvedMedia, identity: &ParsedIdentity) -> &str {
        let sep = &self.separation;
        let movie = resolved.kind == MediaKind::Movie;
        let routes = [
            (
                sep.anime && (identity.flags.anime || resolved.anime_hint),
                &sep.anime_movie_folder,
                &sep.anime_show_folder,
            ),
            (
                sep.kids && (identity.flags.kids || resolved.is_family_rating()),
                &sep.kids_movie_folder,
                &sep.kids_show_folder,
            ),
            (sep.uhd && identity.flags.uhd, &sep.uhd_movie_folder, &sep.uhd_show_folder),
            (true, &self.layout.movie_folder, &self.layout.show_folder),
        ];

        routes
            .into_iter()
            .filter(|(applies, _, _)| *applies)
            .map(|(_, movie_folder, show_folder)| {
                if movie { movie_folder.as_str() } else { show_folder.as_str() }
            })
            .find(|folder| !folder.trim().is_empty())
            .unwrap_or_default()
    }
}

/// First matching tier: remux-4K, remux-1080p, 2160p, 1080p, 720p, 480p,
/// DVD, default.
fn tier_folder<'a>(tiers: &'a ResolutionTiers, identity: &ParsedIdentity) -> &'a str {
    let remux = identity.quality.remux;
    match identity.quality.resolution {
        Some(ResolutionTag::Uhd2160) if remux => &tiers.remux_4k,
        Some(ResolutionTag::Fhd1080) if remux => &tiers.remux_1080p,
        Some(ResolutionTag::Uhd2160) => &tiers.uhd_2160p,
        Some(ResolutionTag::Fhd1080) => &tiers.fhd_1080p,
        Some(ResolutionTag::Hd720) => &tiers.hd_720p,
        Some(ResolutionTag::Sd576 | ResolutionTag::Sd480) => &tiers.sd_480p,
        Some(ResolutionTag::Dvd) => &tiers.dvd,
        None => &tiers.default,
    }
}

/// Convenience wrapper over [`PathBuilder`] for one-off computations.
pub fn build_path(
    resolved: &ResolvedMedia,
    identity: &ParsedIdentity,
    source_relative: &Path,
    config: &Config,
) -> DestinationPath {
    PathBuilder::new(config).build(resolved, identity, source_relative)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use cinesync_model::{CollectionRef, ContentFlags, ExternalId, QualityInfo};

    use super::*;

    fn config() -> Config {
        let mut config = Config::default();
        config.paths.destination_dir = PathBuf::from("/library");
        config
    }

    fn movie(title: &str, year: i32) -> ResolvedMedia {
        ResolvedMedia {
            id: ExternalId::tmdb(1),
            kind: MediaKind::Movie,
            title: title.into(),
            release_date: NaiveDate::from_ymd_opt(year, 6, 1),
            content_rating: None,
            collection: None,
            poster_path: None,
            backdrop_path: None,
            anime_hint: false,
        }
    }

    fn show(title: &str) -> ResolvedMedia {
        ResolvedMedia {
            kind: MediaKind::Tv,
            release_date: None,
            ..movie(title, 2000)
        }
    }

    fn identity(resolution: Option<ResolutionTag>, remux: bool) -> ParsedIdentity {
        ParsedIdentity {
            title: "x".into(),
            quality: QualityInfo {
                resolution,
                remux,
                source: None,
            },
            extension: "mkv".into(),
            ..ParsedIdentity::default()
        }
    }

    #[test]
    fn movie_default_layout() {
        let dest = build_path(
            &movie("Heat", 1995),
            &identity(Some(ResolutionTag::Fhd1080), false),
            Path::new("heat.1995.1080p.mkv"),
            &config(),
        );
        assert_eq!(
            dest.absolute(),
            PathBuf::from("/library/Movies/Heat (1995)/Heat (1995).mkv")
        );
    }

    #[test]
    fn episode_layout_pads_season() {
        let mut id = identity(Some(ResolutionTag::Fhd1080), false);
        id.season = Some(2);
        id.episode = Some(5);
        let dest = build_path(
            &show("Show Name"),
            &id,
            Path::new("Show.Name.S02E05.1080p.mkv"),
            &config(),
        );
        assert_eq!(
            dest.relative(),
            Path::new("Shows/Show Name/Season 02/Show Name - S02E05.mkv")
        );
    }

    #[test]
    fn resolution_tiers_first_match_wins() {
        let mut config = config();
        config.resolution.enabled = true;
        let builder = PathBuilder::new(&config);
        let film = movie("Dune", 2021);

        let remux = builder.build(
            &film,
            &identity(Some(ResolutionTag::Uhd2160), true),
            Path::new("dune.mkv"),
        );
        assert!(remux.relative().starts_with("Movies/UltraHDRemux/Dune (2021)"));

        let plain = builder.build(
            &film,
            &identity(Some(ResolutionTag::Fhd1080), false),
            Path::new("dune.mkv"),
        );
        assert!(plain.relative().starts_with("Movies/Dune (2021)"));

        let dvd = builder.build(
            &film,
            &identity(Some(ResolutionTag::Dvd), false),
            Path::new("dune.mkv"),
        );
        assert!(dvd.relative().starts_with("Movies/RetroDVD/"));
    }

    #[test]
    fn separation_priority_anime_over_kids_over_uhd() {
        let mut config = config();
        config.separation.anime = true;
        config.separation.kids = true;
        config.separation.uhd = true;
        let builder = PathBuilder::new(&config);

        let mut id = identity(Some(ResolutionTag::Uhd2160), false);
        id.flags = ContentFlags {
            anime: true,
            kids: true,
            uhd: true,
        };
        let dest = builder.build(&movie("Spirited Away", 2001), &id, Path::new("a.mkv"));
        assert!(dest.relative().starts_with("AnimeMovies"));

        id.flags.anime = false;
        let dest = builder.build(&movie("Spirited Away", 2001), &id, Path::new("a.mkv"));
        assert!(dest.relative().starts_with("KidsMovies"));

        id.flags.kids = false;
        let dest = builder.build(&movie("Spirited Away", 2001), &id, Path::new("a.mkv"));
        assert!(dest.relative().starts_with("4KMovies"));
    }

    #[test]
    fn family_rating_routes_to_kids() {
        let mut config = config();
        config.separation.kids = true;
        let mut film = movie("Up", 2009);
        film.content_rating = Some("PG".into());
        let dest = build_path(&film, &identity(None, false), Path::new("up.mkv"), &config);
        assert!(dest.relative().starts_with("KidsMovies/Up (2009)"));
    }

    #[test]
    fn collections_nest_movies() {
        let mut config = config();
        config.collections.enabled = true;
        let mut film = movie("The Matrix", 1999);
        film.collection = Some(CollectionRef {
            id: 2344,
            name: "The Matrix Collection".into(),
        });
        let dest = build_path(&film, &identity(None, false), Path::new("m.mkv"), &config);
        assert_eq!(
            dest.relative(),
            Path::new("Movies/The Matrix Collection/The Matrix (1999)/The Matrix (1999).mkv")
        );
    }

    #[test]
    fn source_layout_mirrors_relative_path() {
        let mut config = config();
        config.layout.mode = LayoutMode::Source;
        config.resolution.enabled = true;
        let dest = build_path(
            &movie("Heat", 1995),
            &identity(Some(ResolutionTag::Uhd2160), false),
            Path::new("Films/Heat/heat.mkv"),
            &config,
        );
        assert_eq!(dest.relative(), Path::new("Movies/Films/Heat/heat.mkv"));
    }

    #[test]
    fn rename_off_keeps_original_name() {
        let mut config = config();
        config.layout.rename_files = false;
        let dest = build_path(
            &movie("Heat", 1995),
            &identity(None, false),
            Path::new("dl/heat.1995.mkv"),
            &config,
        );
        assert_eq!(dest.relative(), Path::new("Movies/Heat (1995)/heat.1995.mkv"));
    }

    #[test]
    fn build_is_idempotent() {
        let builder = PathBuilder::new(&config());
        let mut id = identity(Some(ResolutionTag::Hd720), false);
        id.air_date = NaiveDate::from_ymd_opt(2024, 1, 15);
        let first = builder.build(&show("The Daily Show"), &id, Path::new("d.mkv"));
        let second = builder.build(&show("The Daily Show"), &id, Path::new("d.mkv"));
        assert_eq!(first, second);
        assert_eq!(
            first.relative(),
            Path::new("Shows/The Daily Show/Season 2024/The Daily Show - 2024-01-15.mkv")
        );
    }
}
