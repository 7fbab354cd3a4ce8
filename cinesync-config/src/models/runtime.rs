use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Filesystem watch tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub enabled: bool,
    /// Walk every source root once at startup before watching.
    pub initial_scan: bool,
    /// Quiet window a path must observe before its event is emitted.
    pub debounce_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            initial_scan: true,
            debounce_ms: 2_000,
        }
    }
}

impl MonitorConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// Retry policy for records whose resolution failed transiently.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failed resolution passes tolerated before a record becomes `Failed`.
    pub max_resolve_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Percentage-based jitter to spread out retries.
    pub jitter_ratio: f32,
}

impl RetryConfig {
    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_resolve_retries: 3,
            backoff_base_ms: 30_000,
            backoff_max_ms: 30 * 60 * 1_000,
            jitter_ratio: 0.25,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkersConfig {
    /// Pipeline workers draining the processing queue.
    pub pipeline: usize,
    pub retry: RetryConfig,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            pipeline: num_cpus::get(),
            retry: RetryConfig::default(),
        }
    }
}

/// Metadata provider access and request budget.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub language: String,
    /// Outstanding provider requests allowed at once.
    pub max_concurrent: usize,
    /// Token-bucket refill rate.
    pub requests_per_second: u32,
    pub request_timeout_ms: u64,
    /// Attempts per lookup before a transient failure is surfaced.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Ranked candidates kept for disambiguation.
    pub candidate_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.themoviedb.org/3".into(),
            language: "en-US".into(),
            max_concurrent: 4,
            requests_per_second: 20,
            request_timeout_ms: 10_000,
            max_attempts: 3,
            backoff_base_ms: 500,
            backoff_max_ms: 8_000,
            candidate_limit: 8,
        }
    }
}

impl ResolverConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }
}

/// Write-behind tuning for the record store.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub database_url: String,
    pub batch_size: usize,
    /// Upper bound on write operations per second across flush workers.
    pub max_ops_per_second: u32,
    pub flush_workers: usize,
    pub flush_interval_ms: u64,
    pub write_retries: u32,
    pub write_retry_delay_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:cinesync.db".into(),
            batch_size: 64,
            max_ops_per_second: 200,
            flush_workers: 1,
            flush_interval_ms: 250,
            write_retries: 3,
            write_retry_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Sweep the destination root in addition to the vault directories.
    pub include_destination: bool,
    pub vault_dirs: Vec<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 6 * 60 * 60,
            include_destination: true,
            vault_dirs: Vec::new(),
        }
    }
}

impl AuditConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
