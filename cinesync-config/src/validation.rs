use std::path::PathBuf;

use thiserror::Error;

use crate::models::Config;

/// Hard configuration errors. Startup stops on any of these.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no source directories configured")]
    NoSourceDirs,
    #[error("destination directory is not set")]
    MissingDestination,
    #[error("destination directory must be absolute: {0}")]
    RelativeDestination(PathBuf),
    #[error("source directory must be absolute: {0}")]
    RelativeSource(PathBuf),
    #[error("destination {destination} lies inside source directory {source_dir}")]
    DestinationInsideSource {
        destination: PathBuf,
        source_dir: PathBuf,
    },
    #[error("{field} must be greater than zero")]
    ZeroBudget { field: &'static str },
    #[error("no video extensions configured")]
    NoVideoExtensions,
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

const MIN_DEBOUNCE_MS: u64 = 50;

impl Config {
    /// Validate the configuration once, at startup.
    pub fn validate(&self) -> Result<ConfigWarnings, ConfigError> {
        let mut warnings = ConfigWarnings::default();
        let paths = &self.paths;

        if paths.source_dirs.is_empty() {
            return Err(ConfigError::NoSourceDirs);
        }
        if paths.destination_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingDestination);
        }
        if !paths.destination_dir.is_absolute() {
            return Err(ConfigError::RelativeDestination(
                paths.destination_dir.clone(),
            ));
        }
        for source in &paths.source_dirs {
            if !source.is_absolute() {
                return Err(ConfigError::RelativeSource(source.clone()));
            }
            if paths.destination_dir.starts_with(source) {
                return Err(ConfigError::DestinationInsideSource {
                    destination: paths.destination_dir.clone(),
                    source_dir: source.clone(),
                });
            }
            if !source.exists() {
                warnings.push(format!(
                    "source directory {} does not exist yet",
                    source.display()
                ));
            }
        }
        if paths.video_extensions.is_empty() {
            return Err(ConfigError::NoVideoExtensions);
        }

        for (field, value) in [
            ("workers.pipeline", self.workers.pipeline),
            ("resolver.max_concurrent", self.resolver.max_concurrent),
            ("resolver.candidate_limit", self.resolver.candidate_limit),
            ("persistence.batch_size", self.persistence.batch_size),
            ("persistence.flush_workers", self.persistence.flush_workers),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroBudget { field });
            }
        }
        if self.resolver.requests_per_second == 0 {
            return Err(ConfigError::ZeroBudget {
                field: "resolver.requests_per_second",
            });
        }
        if self.resolver.max_attempts == 0 {
            return Err(ConfigError::ZeroBudget {
                field: "resolver.max_attempts",
            });
        }
        if self.persistence.max_ops_per_second == 0 {
            return Err(ConfigError::ZeroBudget {
                field: "persistence.max_ops_per_second",
            });
        }

        if !self.resolver.has_api_key() {
            warnings.push_with_hint(
                "TMDB API key not configured; every lookup will fail",
                "Set TMDB_API_KEY or resolver.api_key",
            );
        }
        if self.monitor.enabled && self.monitor.debounce_ms < MIN_DEBOUNCE_MS {
            warnings.push_with_hint(
                format!(
                    "monitor debounce of {}ms is very short; files still being copied may be processed early",
                    self.monitor.debounce_ms
                ),
                format!("Use at least {MIN_DEBOUNCE_MS}ms"),
            );
        }
        if self.workers.retry.max_resolve_retries == 0 {
            warnings.push(
                "workers.retry.max_resolve_retries is 0; transient provider errors fail records immediately",
            );
        }
        if self.audit.enabled && self.audit_dirs().is_empty() {
            warnings.push(
                "broken-link audit enabled without any directories to sweep",
            );
        }

        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        let mut config = Config::default();
        config.paths.source_dirs = vec![PathBuf::from("/srv/downloads")];
        config.paths.destination_dir = PathBuf::from("/srv/library");
        config.resolver.api_key = Some("key".into());
        config
    }

    #[test]
    fn rejects_missing_sources() {
        let mut config = valid();
        config.paths.source_dirs.clear();
        assert_eq!(config.validate().unwrap_err(), ConfigError::NoSourceDirs);
    }

    #[test]
    fn rejects_destination_inside_source() {
        let mut config = valid();
        config.paths.destination_dir = PathBuf::from("/srv/downloads/library");
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DestinationInsideSource { .. })
        ));
    }

    #[test]
    fn rejects_zero_budgets() {
        let mut config = valid();
        config.workers.pipeline = 0;
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::ZeroBudget {
                field: "workers.pipeline"
            }
        );
    }

    #[test]
    fn warns_on_missing_key_and_tiny_debounce() {
        let mut config = valid();
        config.resolver.api_key = None;
        config.monitor.debounce_ms = 10;
        let warnings = config.validate().unwrap();
        assert!(warnings.iter().any(|w| w.message.contains("TMDB API key")));
        assert!(warnings.iter().any(|w| w.message.contains("debounce")));
    }
}
