//! The single configuration record for the resolution engine (spec §9).
//!
//! Defaults mirror the constants the original service hardcoded
//! (`RETRY`, `ANN_WAIT_TIME`, `MAX_CONCURRENT_ANN_REQUESTS`,
//! `FILES_TO_PROCESS_THRESH`, `WORK_OVERFLOW_BATCH_SIZE`,
//! `DAEMON_WAIT_AT_NEWEST`, `ENABLE_TRY`), loaded here as a `toml` file
//! instead of inline Python literals.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Local database naming, independent of which storage backend is wired
    /// in (kept for parity with the original's sqlite filename setting).
    pub database: DatabaseConfig,
    /// Upstream Mercurial repository coordinates.
    pub hg: HgConfig,
    /// Optional legacy annotate-cache fallback; unset unless wired in.
    pub hg_cache: Option<HgCacheConfig>,
    /// Maximum annotate requests in flight at once (C5). Original default: 5.
    pub max_concurrent_ann_requests: usize,
    /// How long a caller waits for an in-flight annotate acquisition before
    /// giving up. Original default: 5 hours.
    #[serde(with = "humantime_duration")]
    pub ann_wait: Duration,
    /// File-count threshold above which `resolve` dispatches to a
    /// background worker instead of blocking the caller (C7). Original
    /// default: 5.
    pub files_to_process_thresh: usize,
    /// Batch size used when splitting overflow work across background
    /// workers (C7). Original default: 250.
    pub work_overflow_batch_size: usize,
    /// Maximum changesets the Frontier Mover processes in one call before
    /// yielding (C6). Original default: 30.
    pub max_csets_proc: usize,
    /// How long the Prefetch Daemon sleeps when it finds itself already at
    /// the newest known revision (C9). Original default: 30 seconds.
    #[serde(with = "humantime_duration")]
    pub daemon_wait_at_newest: Duration,
    /// Whether to resolve files against ephemeral "try" pushes (C8).
    /// Original default: `false`.
    pub enable_try: bool,
    /// Whether the Prefetch Daemon (C9) restricts itself to revisions an
    /// external coverage index reports as covered. Original default:
    /// `false`.
    pub only_coverage_revisions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            database: DatabaseConfig::default(),
            hg: HgConfig::default(),
            hg_cache: None,
            max_concurrent_ann_requests: 5,
            ann_wait: Duration::from_secs(5 * 60 * 60),
            files_to_process_thresh: 5,
            work_overflow_batch_size: 250,
            max_csets_proc: 30,
            daemon_wait_at_newest: Duration::from_secs(30),
            enable_try: false,
            only_coverage_revisions: false,
        }
    }
}

impl Config {
    /// Parse a `Config` from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Local database naming.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Name used for the durable counter/annotation files on disk.
    pub name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            name: "tuid".to_string(),
        }
    }
}

/// Upstream Mercurial repository coordinates (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HgConfig {
    /// Branch to track (used by the Prefetch Daemon's `tip` lookups).
    pub branch: String,
    /// Base URL of the Mercurial web interface, e.g.
    /// `https://hg.mozilla.org/mozilla-central`.
    pub url: String,
}

impl Default for HgConfig {
    fn default() -> Self {
        HgConfig {
            branch: "default".to_string(),
            url: String::new(),
        }
    }
}

/// Legacy annotate-cache fallback configuration. Unused unless a caller
/// wires a cache-backed `RawFileOracle` implementation in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HgCacheConfig {
    /// Base URL of the cache service.
    pub url: String,
}

impl Default for HgCacheConfig {
    fn default() -> Self {
        HgCacheConfig { url: String::new() }
    }
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        value.as_secs().serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(de)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_service_constants() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_ann_requests, 5);
        assert_eq!(config.ann_wait, Duration::from_secs(5 * 60 * 60));
        assert_eq!(config.files_to_process_thresh, 5);
        assert_eq!(config.work_overflow_batch_size, 250);
        assert_eq!(config.max_csets_proc, 30);
        assert_eq!(config.daemon_wait_at_newest, Duration::from_secs(30));
        assert!(!config.enable_try);
        assert!(!config.only_coverage_revisions);
    }

    #[test]
    fn parses_partial_toml_over_defaults() {
        let config = Config::from_toml(
            r#"
            enable_try = true

            [hg]
            branch = "try"
            url = "https://hg.mozilla.org/try"
            "#,
        )
        .unwrap();
        assert!(config.enable_try);
        assert_eq!(config.hg.branch, "try");
        assert_eq!(config.max_concurrent_ann_requests, 5);
    }
}
