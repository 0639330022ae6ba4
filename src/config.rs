//! Configuration for the cache and sync subsystem.
//!
//! # Example
//!
//! ```
//! use satchel_sync::SatchelConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SatchelConfig::default();
//! assert_eq!(config.memory_max_bytes, 32 * 1024 * 1024); // 32 MB
//! assert_eq!(config.sync_freshness_secs, 300); // 5 minutes
//!
//! // Full config
//! let config = SatchelConfig {
//!     cache_dir: "/var/cache/satchel".into(),
//!     memory_max_bytes: 8 * 1024 * 1024,
//!     disk_max_bytes: 64 * 1024 * 1024,
//!     ..Default::default()
//! };
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Configuration for the tiered cache and sync coordinator.
///
/// All fields have sensible defaults. At minimum you should set `cache_dir`
/// to a directory that is exclusive to this subsystem.
#[derive(Debug, Clone, Deserialize)]
pub struct SatchelConfig {
    /// Directory for the persistent cache tier (exclusive to this subsystem)
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Memory tier payload budget in bytes (default: 32 MB)
    #[serde(default = "default_memory_max_bytes")]
    pub memory_max_bytes: usize,

    /// Persistent tier byte budget for trim_to_capacity (default: 256 MB)
    #[serde(default = "default_disk_max_bytes")]
    pub disk_max_bytes: u64,

    /// Default TTL applied when store() is called without one (default: 7 days).
    /// `None` means entries without an explicit TTL never expire.
    #[serde(default = "default_ttl_secs")]
    pub default_ttl_secs: Option<u64>,

    /// Freshness window for sync_if_needed (default: 300 s).
    /// A successful sync within this window makes further calls no-ops.
    #[serde(default = "default_sync_freshness_secs")]
    pub sync_freshness_secs: u64,

    /// Where the last-successful-sync timestamp is persisted.
    /// Defaults to `last_sync.json` inside `cache_dir`.
    #[serde(default)]
    pub sync_marker_path: Option<PathBuf>,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./satchel-cache")
}
fn default_memory_max_bytes() -> usize {
    32 * 1024 * 1024
}
fn default_disk_max_bytes() -> u64 {
    256 * 1024 * 1024
}
fn default_ttl_secs() -> Option<u64> {
    Some(7 * 24 * 60 * 60)
}
fn default_sync_freshness_secs() -> u64 {
    300
}

impl Default for SatchelConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            memory_max_bytes: default_memory_max_bytes(),
            disk_max_bytes: default_disk_max_bytes(),
            default_ttl_secs: default_ttl_secs(),
            sync_freshness_secs: default_sync_freshness_secs(),
            sync_marker_path: None,
        }
    }
}

impl SatchelConfig {
    /// Default TTL as a `Duration`, if one is configured.
    #[must_use]
    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl_secs.map(Duration::from_secs)
    }

    /// Freshness window as a `Duration`.
    #[must_use]
    pub fn sync_freshness(&self) -> Duration {
        Duration::from_secs(self.sync_freshness_secs)
    }

    /// Resolved path of the persisted sync marker.
    #[must_use]
    pub fn resolved_marker_path(&self) -> PathBuf {
        self.sync_marker_path
            .clone()
            .unwrap_or_else(|| self.cache_dir.join("last_sync.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SatchelConfig::default();
        assert_eq!(config.memory_max_bytes, 32 * 1024 * 1024);
        assert_eq!(config.disk_max_bytes, 256 * 1024 * 1024);
        assert_eq!(config.default_ttl_secs, Some(7 * 24 * 60 * 60));
        assert_eq!(config.sync_freshness_secs, 300);
        assert!(config.sync_marker_path.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SatchelConfig =
            serde_json::from_str(r#"{"cache_dir": "/tmp/x", "memory_max_bytes": 1024}"#).unwrap();
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/x"));
        assert_eq!(config.memory_max_bytes, 1024);
        // Unspecified fields fall back to defaults
        assert_eq!(config.sync_freshness_secs, 300);
    }

    #[test]
    fn test_marker_path_defaults_into_cache_dir() {
        let config = SatchelConfig {
            cache_dir: "/tmp/satchel".into(),
            ..Default::default()
        };
        assert_eq!(
            config.resolved_marker_path(),
            PathBuf::from("/tmp/satchel/last_sync.json")
        );

        let explicit = SatchelConfig {
            sync_marker_path: Some("/tmp/marker.json".into()),
            ..config
        };
        assert_eq!(
            explicit.resolved_marker_path(),
            PathBuf::from("/tmp/marker.json")
        );
    }

    #[test]
    fn test_no_default_ttl_means_no_expiry() {
        let config: SatchelConfig =
            serde_json::from_str(r#"{"default_ttl_secs": null}"#).unwrap();
        assert!(config.default_ttl().is_none());
    }
}
