//! Configuration for CineSync.
//!
//! One explicit [`Config`] struct covers every tunable of the organizer:
//! source/destination roots, layout policy, content separation, resolution
//! tiers, link mode and conflict policy, monitor debounce, worker budgets,
//! resolver limits, persistence throttles and the broken-link audit. The
//! [`ConfigLoader`] merges a TOML/JSON file with environment overrides and
//! validates the result once.
#![allow(missing_docs)]

pub mod loader;
pub mod models;
pub mod sources;
pub mod util;
pub mod validation;

pub use loader::{
    ConfigLoad, ConfigLoader, ConfigLoaderOptions, ConfigMetadata,
    ConfigSource, error::ConfigLoadError,
};
pub use models::layout::{
    CollectionsConfig, ConflictPolicy, LayoutConfig, LayoutMode, LinkMode,
    LinksConfig, ResolutionConfig, ResolutionTiers, SeparationConfig,
};
pub use models::runtime::{
    AuditConfig, MonitorConfig, PersistenceConfig, ResolverConfig,
    RetryConfig, WorkersConfig,
};
pub use models::{Config, DEFAULT_VIDEO_EXTENSIONS, PathsConfig};
pub use sources::EnvConfig;
pub use validation::{ConfigError, ConfigWarning, ConfigWarnings};
