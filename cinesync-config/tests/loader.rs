use std::fs;
use std::path::PathBuf;

use cinesync_config::{
    ConfigError, ConfigLoadError, ConfigLoader, ConfigSource, ConflictPolicy,
    EnvConfig, LayoutMode, LinkMode,
};
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn loads_toml_sections_with_defaults() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("downloads");
    let dest = dir.path().join("library");
    fs::create_dir_all(&source).unwrap();

    let path = write(
        &dir,
        "cinesync.toml",
        &format!(
            r#"
[paths]
source_dirs = ["{}"]
destination_dir = "{}"
video_extensions = [".MKV", "mp4"]

[layout]
mode = "source"

[links]
mode = "relative"
conflict_policy = "version-suffix"

[resolver]
api_key = "abc"
requests_per_second = 5
"#,
            source.display(),
            dest.display()
        ),
    );

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .expect("config loads");

    let config = load.config;
    assert_eq!(load.metadata.source, ConfigSource::Explicit(path));
    assert_eq!(config.layout.mode, LayoutMode::Source);
    assert_eq!(config.links.mode, LinkMode::Relative);
    assert_eq!(config.links.conflict_policy, ConflictPolicy::VersionSuffix);
    assert_eq!(config.resolver.requests_per_second, 5);
    assert_eq!(config.paths.video_extensions, vec!["mkv", "mp4"]);
    // untouched sections fall back to defaults
    assert_eq!(config.layout.movie_folder, "Movies");
    assert_eq!(config.workers.retry.max_resolve_retries, 3);
    assert!(load.warnings.is_empty());
}

#[test]
fn env_overrides_win_over_file() {
    let dir = TempDir::new().unwrap();
    let path = write(
        &dir,
        "cinesync.json",
        r#"{"paths": {"source_dirs": ["/nowhere/a"], "destination_dir": "/nowhere/lib"}}"#,
    );

    let env = EnvConfig {
        source_dirs: Some(vec![
            PathBuf::from("/mnt/one"),
            PathBuf::from("/mnt/two"),
        ]),
        tmdb_api_key: Some("from-env".into()),
        workers: Some(3),
        ..EnvConfig::default()
    };

    let load = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(env)
        .expect("config loads");

    assert_eq!(
        load.config.paths.source_dirs,
        vec![PathBuf::from("/mnt/one"), PathBuf::from("/mnt/two")]
    );
    assert_eq!(load.config.resolver.api_key.as_deref(), Some("from-env"));
    assert_eq!(load.config.workers.pipeline, 3);
    assert_eq!(load.config.paths.destination_dir, PathBuf::from("/nowhere/lib"));
}

#[test]
fn inline_json_is_used_without_a_file() {
    let env = EnvConfig {
        config_json: Some(
            r#"{"paths": {"source_dirs": ["/in"], "destination_dir": "/out"}, "resolver": {"api_key": "k"}}"#
                .into(),
        ),
        ..EnvConfig::default()
    };

    let load = ConfigLoader::new().load_with_env(env).expect("loads");
    assert_eq!(load.metadata.source, ConfigSource::EnvInline);
    assert_eq!(load.config.paths.destination_dir, PathBuf::from("/out"));
}

#[test]
fn invalid_configuration_is_rejected_once_at_load() {
    let env = EnvConfig {
        config_json: Some(
            r#"{"paths": {"source_dirs": ["/in"], "destination_dir": "relative/out"}}"#
                .into(),
        ),
        ..EnvConfig::default()
    };

    let err = ConfigLoader::new().load_with_env(env).unwrap_err();
    assert!(matches!(
        err,
        ConfigLoadError::Invalid(ConfigError::RelativeDestination(_))
    ));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = ConfigLoader::new()
        .with_config_path(dir.path().join("absent.toml"))
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn malformed_file_reports_origin() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "cinesync.toml", "[paths\nsource_dirs = 3");
    let err = ConfigLoader::new()
        .with_config_path(&path)
        .load_with_env(EnvConfig::default())
        .unwrap_err();
    match err {
        ConfigLoadError::Parse { origin, .. } => {
            assert!(origin.ends_with("cinesync.toml"))
        }
        other => panic!("unexpected error: {other:?}"),
    }
}
