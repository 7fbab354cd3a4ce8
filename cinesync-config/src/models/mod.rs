pub mod layout;
pub mod runtime;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use layout::{
    CollectionsConfig, LayoutConfig, LinksConfig, ResolutionConfig,
    SeparationConfig,
};
use runtime::{
    AuditConfig, MonitorConfig, PersistenceConfig, ResolverConfig,
    WorkersConfig,
};

pub const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "avi", "mov", "webm", "flv", "wmv", "m4v", "mpg", "mpeg",
    "ts", "m2ts",
];

fn default_video_extensions() -> Vec<String> {
    DEFAULT_VIDEO_EXTENSIONS
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub source_dirs: Vec<PathBuf>,
    pub destination_dir: PathBuf,
    /// File extensions treated as video. Matched case-insensitively.
    pub video_extensions: Vec<String>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            source_dirs: Vec::new(),
            destination_dir: PathBuf::new(),
            video_extensions: default_video_extensions(),
        }
    }
}

impl PathsConfig {
    pub fn is_video_extension(&self, ext: &str) -> bool {
        self.video_extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext))
    }

    pub fn is_video_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.is_video_extension(ext))
    }
}

/// The single explicit configuration consumed by the organizer.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub layout: LayoutConfig,
    pub separation: SeparationConfig,
    pub resolution: ResolutionConfig,
    pub collections: CollectionsConfig,
    pub links: LinksConfig,
    pub monitor: MonitorConfig,
    pub workers: WorkersConfig,
    pub resolver: ResolverConfig,
    pub persistence: PersistenceConfig,
    pub audit: AuditConfig,
}

impl Config {
    pub fn destination(&self) -> &Path {
        &self.paths.destination_dir
    }

    /// Directories covered by broken-link sweeps.
    pub fn audit_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if self.audit.include_destination
            && !self.paths.destination_dir.as_os_str().is_empty()
        {
            dirs.push(self.paths.destination_dir.clone());
        }
        for vault in &self.audit.vault_dirs {
            if !dirs.contains(vault) {
                dirs.push(vault.clone());
            }
        }
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_matching_ignores_case() {
        let paths = PathsConfig::default();
        assert!(paths.is_video_path(Path::new("/a/b/Movie.MKV")));
        assert!(!paths.is_video_path(Path::new("/a/b/Movie.nfo")));
        assert!(!paths.is_video_path(Path::new("/a/b/README")));
    }

    #[test]
    fn audit_dirs_deduplicate_destination() {
        let mut config = Config::default();
        config.paths.destination_dir = PathBuf::from("/library");
        config.audit.vault_dirs =
            vec![PathBuf::from("/library"), PathBuf::from("/vault")];
        assert_eq!(
            config.audit_dirs(),
            vec![PathBuf::from("/library"), PathBuf::from("/vault")]
        );

        config.audit.include_destination = false;
        assert_eq!(
            config.audit_dirs(),
            vec![PathBuf::from("/library"), PathBuf::from("/vault")]
        );
    }
}
