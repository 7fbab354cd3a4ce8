use std::path::PathBuf;

use thiserror::Error;

use crate::validation::ConfigError;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Invalid(#[from] ConfigError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}
