use serde::{Deserialize, Serialize};

/// Folder scheme used under the destination root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    /// `Movies/Title (Year)/...` and `Shows/Title (Year)/Season NN/...`.
    #[default]
    Cinesync,
    /// Mirror the directory structure found under the source root.
    Source,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub mode: LayoutMode,
    /// Rename linked files to the normalized `Title (Year)` form. When off
    /// the original file name is kept.
    pub rename_files: bool,
    /// Append ` - 1080p` style resolution suffixes to renamed files.
    pub resolution_in_name: bool,
    pub movie_folder: String,
    pub show_folder: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            mode: LayoutMode::Cinesync,
            rename_files: true,
            resolution_in_name: false,
            movie_folder: "Movies".into(),
            show_folder: "Shows".into(),
        }
    }
}

/// Content-type routing into dedicated top-level folders. When several
/// apply, anime wins over kids which wins over 4K.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SeparationConfig {
    pub anime: bool,
    pub kids: bool,
    pub uhd: bool,
    pub anime_movie_folder: String,
    pub anime_show_folder: String,
    pub kids_movie_folder: String,
    pub kids_show_folder: String,
    pub uhd_movie_folder: String,
    pub uhd_show_folder: String,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            anime: false,
            kids: false,
            uhd: false,
            anime_movie_folder: "AnimeMovies".into(),
            anime_show_folder: "AnimeShows".into(),
            kids_movie_folder: "KidsMovies".into(),
            kids_show_folder: "KidsShows".into(),
            uhd_movie_folder: "4KMovies".into(),
            uhd_show_folder: "4KShows".into(),
        }
    }
}

/// Folder names for each resolution tier. An empty name means media in
/// that tier sits directly under the content folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolutionTiers {
    pub remux_4k: String,
    pub remux_1080p: String,
    pub uhd_2160p: String,
    pub fhd_1080p: String,
    pub hd_720p: String,
    pub sd_480p: String,
    pub dvd: String,
    pub default: String,
}

impl Default for ResolutionTiers {
    fn default() -> Self {
        Self {
            remux_4k: "UltraHDRemux".into(),
            remux_1080p: "RemuxHD".into(),
            uhd_2160p: "UltraHD".into(),
            fhd_1080p: String::new(),
            hd_720p: "HD720".into(),
            sd_480p: "Retro480p".into(),
            dvd: "RetroDVD".into(),
            default: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Insert a resolution-tier folder between the content folder and the
    /// title folder.
    pub enabled: bool,
    pub movie_tiers: ResolutionTiers,
    pub show_tiers: ResolutionTiers,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionsConfig {
    /// Nest movies that belong to a franchise under the collection name.
    pub enabled: bool,
}

/// How the link target is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinkMode {
    #[default]
    Absolute,
    Relative,
}

/// What to do when the destination is already occupied by something else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    /// Park the file and wait for an operator decision.
    #[default]
    Prompt,
    Skip,
    /// Link under the next free ` - vN` name.
    VersionSuffix,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct LinksConfig {
    pub mode: LinkMode,
    pub conflict_policy: ConflictPolicy,
}
