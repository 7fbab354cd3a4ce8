//! Exponential backoff with deterministic jitter.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Duration;

use cinesync_config::{ResolverConfig, RetryConfig};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub base_ms: u64,
    pub max_ms: u64,
    pub jitter_ratio: f64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration, jitter_ratio: f64) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
            jitter_ratio,
        }
    }

    /// Backoff between attempts of a single provider lookup.
    pub fn for_requests(config: &ResolverConfig) -> Self {
        Self {
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
            jitter_ratio: 0.0,
        }
    }

    /// Backoff between whole resolution passes of a record.
    pub fn for_passes(config: &RetryConfig) -> Self {
        Self {
            base_ms: config.backoff_base_ms,
            max_ms: config.backoff_max_ms,
            jitter_ratio: f64::from(config.jitter_ratio),
        }
    }

    fn base_delay_ms(&self, attempt: u32) -> u64 {
        if attempt == 0 {
            return 0;
        }

        let exp = attempt.saturating_sub(1).min(32) as i32;
        let scaled = (self.base_ms as f64) * 2f64.powi(exp);
        let capped = scaled.min(self.max_ms as f64);
        capped.max(0.0) as u64
    }

    /// Delay before retry number `attempt` (1-based) of the work identified
    /// by `key`. The same key and attempt always yield the same delay.
    pub fn delay<K: Hash + ?Sized>(&self, key: &K, attempt: u32) -> Duration {
        let anchor_ms = self.base_delay_ms(attempt);
        if anchor_ms == 0 {
            return Duration::ZERO;
        }

        let jitter_span =
            ((anchor_ms as f64) * self.jitter_ratio.max(0.0)).min(self.max_ms as f64);
        let lower = 0f64.max(anchor_ms as f64 - jitter_span);
        let upper = (anchor_ms as f64 + jitter_span).min(self.max_ms as f64);
        if upper <= lower {
            return Duration::from_millis(lower.round() as u64);
        }

        let unit = deterministic_unit(key, attempt);
        let jittered = lower + (upper - lower) * unit;
        Duration::from_millis(jittered.round() as u64)
    }
}

fn deterministic_unit<K: Hash + ?Sized>(key: &K, attempt: u32) -> f64 {
    let mut hasher = DefaultHasher::default();
    key.hash(&mut hasher);
    attempt.hash(&mut hasher);
    let bits = hasher.finish();
    (bits as f64) / (u64::MAX as f64)
}
