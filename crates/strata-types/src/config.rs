//! Configuration types for the Strata persistence layer.
//!
//! Every section carries `#[serde(default)]` so a partial `config.toml`
//! deserializes cleanly.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrataConfig {
    /// Directory holding the document files and the `backups/` tree.
    pub data_dir: PathBuf,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Memory ledger settings.
    pub memory: MemoryConfig,
    /// Snapshot and background backup settings.
    pub backup: BackupConfig,
    /// Advisory lock settings.
    pub lock: LockConfig,
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
            memory: MemoryConfig::default(),
            backup: BackupConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

impl StrataConfig {
    /// Configuration rooted at `data_dir` with every other field defaulted.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Default::default()
        }
    }

    /// Directory holding named snapshots.
    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }
}

/// `~/.strata`, or `./.strata` when no home directory is known.
pub fn strata_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".strata")
}

/// `~/.strata/data`.
pub fn default_data_dir() -> PathBuf {
    strata_home().join("data")
}

/// Memory ledger settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Soft cap on memory entries. Eviction triggers above 1.2x this value
    /// and keeps `max_memories / 2` interactions.
    pub max_memories: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { max_memories: 1000 }
    }
}

impl MemoryConfig {
    /// Total entry count above which the eviction sweep runs.
    pub fn cleanup_threshold(&self) -> usize {
        self.max_memories.saturating_add(self.max_memories / 5)
    }

    /// Number of interactions the eviction sweep keeps.
    pub fn keep_interactions(&self) -> usize {
        self.max_memories / 2
    }
}

/// Snapshot settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Whether the background loop runs.
    pub enabled: bool,
    /// Seconds between automatic snapshots.
    pub interval_secs: u64,
    /// Seconds to wait after a failed automatic snapshot.
    pub retry_delay_secs: u64,
    /// Automatic snapshots retained by count.
    pub keep_count: usize,
    /// Automatic snapshots older than this are removed.
    pub max_age_days: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 3600,
            retry_delay_secs: 60,
            keep_count: 10,
            max_age_days: 30,
        }
    }
}

impl BackupConfig {
    /// Interval between automatic snapshots.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    /// Delay after a failed snapshot.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs.max(1))
    }
}

/// Cross-process advisory lock settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// How long a lease stays valid before others may reclaim it.
    pub lease_ttl_ms: u64,
    /// How long to wait for a lock before giving up.
    pub acquire_timeout_ms: u64,
    /// Delay between acquisition attempts.
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ttl_ms: 30_000,
            acquire_timeout_ms: 10_000,
            poll_interval_ms: 10,
        }
    }
}

impl LockConfig {
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: StrataConfig = toml::from_str(
            r#"
            data_dir = "/tmp/strata"
            [memory]
            max_memories = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/strata"));
        assert_eq!(config.memory.max_memories, 10);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.backup.interval_secs, 3600);
        assert_eq!(config.lock.acquire_timeout_ms, 10_000);
    }

    #[test]
    fn test_eviction_bounds() {
        let memory = MemoryConfig { max_memories: 10 };
        assert_eq!(memory.cleanup_threshold(), 12);
        assert_eq!(memory.keep_interactions(), 5);
        assert_eq!(MemoryConfig::default().cleanup_threshold(), 1200);
        let huge = MemoryConfig {
            max_memories: usize::MAX,
        };
        assert_eq!(huge.cleanup_threshold(), usize::MAX);
        assert_eq!(MemoryConfig { max_memories: 7 }.cleanup_threshold(), 8);
    }

    #[test]
    fn test_backup_dir_under_data() {
        let config = StrataConfig::with_data_dir("/srv/strata");
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/strata/backups"));
    }
}
