use std::path::PathBuf;

use crate::util::{non_empty_var, parse_bool_var, parse_csv_var};

/// Environment overrides gathered once at load time.
///
/// Kept as plain data so the merge step can be exercised without touching
/// the process environment.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub config_json: Option<String>,
    pub source_dirs: Option<Vec<PathBuf>>,
    pub destination_dir: Option<PathBuf>,
    pub tmdb_api_key: Option<String>,
    pub database_url: Option<String>,
    pub workers: Option<usize>,
    pub monitor_enabled: Option<bool>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: non_empty_var("CINESYNC_CONFIG_PATH")
                .map(PathBuf::from),
            config_json: non_empty_var("CINESYNC_CONFIG_JSON"),
            source_dirs: parse_csv_var("SOURCE_DIR").map(|dirs| {
                dirs.into_iter().map(PathBuf::from).collect()
            }),
            destination_dir: non_empty_var("DESTINATION_DIR")
                .map(PathBuf::from),
            tmdb_api_key: non_empty_var("TMDB_API_KEY"),
            database_url: non_empty_var("CINESYNC_DATABASE_URL"),
            workers: non_empty_var("CINESYNC_WORKERS")
                .and_then(|raw| raw.trim().parse().ok()),
            monitor_enabled: parse_bool_var("CINESYNC_MONITOR"),
        }
    }
}
