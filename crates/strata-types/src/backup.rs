//! Snapshot metadata, index and report types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Prefix marking a snapshot as automatic.
pub const AUTO_BACKUP_PREFIX: &str = "auto_";

/// Whether a snapshot was taken by the scheduler or on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    /// Taken by the background loop; subject to retention.
    Automatic,
    /// Taken on request; never removed by retention.
    Manual,
}

impl BackupType {
    /// Classify a snapshot by its name.
    pub fn for_name(name: &str) -> Self {
        if name.starts_with(AUTO_BACKUP_PREFIX) {
            BackupType::Automatic
        } else {
            BackupType::Manual
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BackupType::Automatic => "automatic",
            BackupType::Manual => "manual",
        }
    }
}

/// Sidecar written into every snapshot directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    /// When the snapshot was taken.
    pub created: DateTime<Utc>,
    /// Automatic or manual.
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    /// Data file names included.
    pub files: Vec<String>,
    /// Total bytes written.
    pub size: u64,
}

/// The index file listing every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupIndex {
    /// Snapshot name to metadata.
    #[serde(default)]
    pub backups: BTreeMap<String, BackupMetadata>,
    /// When the index was last rewritten.
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

/// A listed snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Snapshot name.
    pub name: String,
    /// Snapshot directory.
    pub path: PathBuf,
    /// Sidecar contents.
    pub metadata: BackupMetadata,
}

/// Result of checking one snapshot's integrity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupVerification {
    /// Whether the snapshot directory exists.
    pub exists: bool,
    /// Whether the sidecar exists and decodes.
    pub metadata_valid: bool,
    /// Files the sidecar lists.
    pub expected_files: Vec<String>,
    /// Data files actually present.
    pub files_found: Vec<String>,
    /// Per-file decode result.
    pub json_valid: BTreeMap<String, bool>,
    /// Overall verdict.
    pub valid: bool,
    /// I/O failure encountered while verifying, if any.
    pub error: Option<String>,
}

/// Aggregate snapshot statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackupStats {
    /// Number of listed snapshots.
    pub total_backups: usize,
    /// Sum of snapshot sizes.
    pub total_size: u64,
    /// Automatic snapshots.
    pub automatic_backups: usize,
    /// Manual snapshots.
    pub manual_backups: usize,
    /// Creation time of the oldest snapshot.
    pub oldest_backup: Option<DateTime<Utc>>,
    /// Creation time of the newest snapshot.
    pub newest_backup: Option<DateTime<Utc>>,
    /// Directory holding the snapshots.
    pub backup_directory: PathBuf,
}
