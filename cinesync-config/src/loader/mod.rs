pub mod error;

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, anyhow};
use tracing::debug;

use crate::models::Config;
use crate::sources::EnvConfig;
use crate::validation::ConfigWarnings;
use error::ConfigLoadError;

const DEFAULT_CONFIG_LOCATIONS: &[&str] =
    &["cinesync.toml", "cinesync.json", "config/cinesync.toml"];

/// Source that produced the file-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    Explicit(PathBuf),
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub source: ConfigSource,
    pub env_file_loaded: bool,
}

#[derive(Debug)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
    /// Skip reading `.env` entirely.
    pub skip_env_file: bool,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Load `.env`, the config file and environment overrides, then
    /// validate the result.
    ///
    /// Evaluation order for the file layer:
    /// 1) an explicit path passed to the loader,
    /// 2) `$CINESYNC_CONFIG_PATH` (TOML or JSON file),
    /// 3) `$CINESYNC_CONFIG_JSON` (inline JSON),
    /// 4) the first existing default location,
    /// 5) built-in defaults.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = self.load_env_file()?;
        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Same as [`ConfigLoader::load`] but with an explicit set of
    /// environment overrides and without reading `.env`.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, source) = self.load_file_config(&env)?;
        let mut config = file_config.unwrap_or_default();
        apply_env_overrides(&mut config, env);
        normalize(&mut config);

        let mut warnings = config.validate()?;
        if source == ConfigSource::Default {
            warnings.push_with_hint(
                "No cinesync.toml detected; using defaults and environment variables",
                "Set CINESYNC_CONFIG_PATH or create cinesync.toml",
            );
        }
        debug!(?source, "configuration loaded");

        Ok(ConfigLoad {
            config,
            warnings,
            metadata: ConfigMetadata {
                source,
                env_file_loaded: false,
            },
        })
    }

    fn load_env_file(&self) -> Result<bool, ConfigLoadError> {
        if self.options.skip_env_file {
            return Ok(false);
        }
        let loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };
        Ok(loaded)
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<Config>, ConfigSource), ConfigLoadError> {
        if let Some(explicit) = &self.options.config_path {
            if !explicit.exists() {
                return Err(ConfigLoadError::MissingConfig {
                    path: explicit.clone(),
                });
            }
            let config = load_from_file(explicit)?;
            return Ok((Some(config), ConfigSource::Explicit(explicit.clone())));
        }

        if let Some(path) = &env.config_path {
            if !path.exists() {
                return Err(ConfigLoadError::MissingConfig { path: path.clone() });
            }
            let config = load_from_file(path)?;
            return Ok((Some(config), ConfigSource::EnvPath(path.clone())));
        }

        if let Some(raw) = &env.config_json {
            let config = parse_json(raw)
                .context("failed to parse CINESYNC_CONFIG_JSON")
                .map_err(|source| ConfigLoadError::Parse {
                    origin: "CINESYNC_CONFIG_JSON".into(),
                    source,
                })?;
            return Ok((Some(config), ConfigSource::EnvInline));
        }

        if let Some(path) = find_default_file() {
            let config = load_from_file(&path)?;
            return Ok((Some(config), ConfigSource::File(path)));
        }

        Ok((None, ConfigSource::Default))
    }
}

pub fn load_from_file(path: &Path) -> Result<Config, ConfigLoadError> {
    let contents =
        fs::read_to_string(path).map_err(|source| ConfigLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let origin = path.display().to_string();

    let parsed = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => parse_json(&contents),
        Some("toml") | Some("tml") => toml::from_str(&contents)
            .map_err(|err| anyhow!("invalid toml: {err}")),
        _ => parse_from_str(&contents, &origin),
    };
    parsed.map_err(|source| ConfigLoadError::Parse { origin, source })
}

pub fn parse_from_str(contents: &str, origin: &str) -> anyhow::Result<Config> {
    // Try TOML first, then JSON for convenience.
    toml::from_str(contents).or_else(|toml_err| {
        serde_json::from_str(contents).map_err(|json_err| {
            anyhow!(
                "failed to parse config {}: toml error: {}; json error: {}",
                origin,
                toml_err,
                json_err
            )
        })
    })
}

pub fn parse_json(raw: &str) -> anyhow::Result<Config> {
    serde_json::from_str(raw).map_err(|err| anyhow!("invalid config json: {err}"))
}

fn find_default_file() -> Option<PathBuf> {
    DEFAULT_CONFIG_LOCATIONS
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
}

fn apply_env_overrides(config: &mut Config, env: EnvConfig) {
    if let Some(dirs) = env.source_dirs
        && !dirs.is_empty()
    {
        config.paths.source_dirs = dirs;
    }
    if let Some(dest) = env.destination_dir {
        config.paths.destination_dir = dest;
    }
    if let Some(key) = env.tmdb_api_key {
        config.resolver.api_key = Some(key);
    }
    if let Some(url) = env.database_url {
        config.persistence.database_url = url;
    }
    if let Some(workers) = env.workers {
        config.workers.pipeline = workers;
    }
    if let Some(enabled) = env.monitor_enabled {
        config.monitor.enabled = enabled;
    }
}

fn normalize(config: &mut Config) {
    for ext in &mut config.paths.video_extensions {
        *ext = ext.trim_start_matches('.').to_ascii_lowercase();
    }
    config.paths.source_dirs.dedup();
}
