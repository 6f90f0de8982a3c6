//! Named full-store snapshots under `<data>/backups/`.
//!
//! Each snapshot is a directory holding one `<kind>.json` per document and a
//! `backup_metadata.json` sidecar. `backup_index.json` maps snapshot names to
//! their metadata. Snapshot contents are read through the store and restored
//! through it, so canonical files are only ever touched by [`DocumentStore`].

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use strata_types::backup::{
    BackupIndex, BackupInfo, BackupMetadata, BackupStats, BackupType, BackupVerification,
};
use strata_types::document::DocumentKind;
use strata_types::error::{StrataError, StrataResult};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::store::DocumentStore;

const METADATA_FILE: &str = "backup_metadata.json";
const INDEX_FILE: &str = "backup_index.json";

/// Creates, lists, restores, verifies and prunes snapshots.
pub struct SnapshotManager {
    store: Arc<DocumentStore>,
    backup_dir: PathBuf,
    index_lock: Mutex<()>,
}

impl SnapshotManager {
    /// Manage snapshots of `store` under its `backups/` directory.
    pub async fn new(store: Arc<DocumentStore>) -> StrataResult<Self> {
        let backup_dir = store.backups_dir();
        tokio::fs::create_dir_all(&backup_dir).await?;
        Ok(Self {
            store,
            backup_dir,
            index_lock: Mutex::new(()),
        })
    }

    /// Directory holding snapshots and the index.
    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Snapshot every document. Without a name, an `auto_backup_<timestamp>`
    /// name is generated and the snapshot counts as automatic. An existing
    /// snapshot is never overwritten.
    pub async fn create_backup(&self, name: Option<&str>) -> StrataResult<PathBuf> {
        let name = match name {
            Some(name) => {
                check_name(name)?;
                name.to_string()
            }
            None => self.fresh_name("auto_backup").await?,
        };
        let path = self.backup_dir.join(&name);
        tokio::fs::create_dir_all(&self.backup_dir).await?;
        match tokio::fs::create_dir(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StrataError::InvalidInput(format!(
                    "Backup '{name}' already exists"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        let mut files = Vec::with_capacity(DocumentKind::ALL.len());
        let mut size = 0u64;
        for kind in DocumentKind::ALL {
            let doc = self.store.read(kind).await?;
            let bytes = serde_json::to_vec_pretty(&doc)?;
            size += bytes.len() as u64;
            tokio::fs::write(path.join(kind.file_name()), &bytes).await?;
            files.push(kind.file_name());
        }

        let metadata = BackupMetadata {
            created: Utc::now(),
            backup_type: BackupType::for_name(&name),
            files,
            size,
        };
        tokio::fs::write(path.join(METADATA_FILE), serde_json::to_vec_pretty(&metadata)?).await?;

        {
            let _guard = self.index_lock.lock().await;
            let mut index = self.load_index().await;
            index.backups.insert(name.clone(), metadata);
            index.last_updated = Some(Utc::now());
            self.save_index(&index).await?;
        }

        info!(backup = %name, size, "Created backup");
        Ok(path)
    }

    /// Indexed snapshots whose directory still exists, newest first.
    pub async fn list_backups(&self) -> StrataResult<Vec<BackupInfo>> {
        let index = self.load_index().await;
        let mut backups = Vec::with_capacity(index.backups.len());
        for (name, metadata) in index.backups {
            let path = self.backup_dir.join(&name);
            if tokio::fs::try_exists(&path).await? {
                backups.push(BackupInfo {
                    name,
                    path,
                    metadata,
                });
            }
        }
        backups.sort_by(|a, b| {
            b.metadata
                .created
                .cmp(&a.metadata.created)
                .then_with(|| b.name.cmp(&a.name))
        });
        Ok(backups)
    }

    /// Restore `name` after taking a `pre_restore_<timestamp>` safety
    /// snapshot. Returns the safety snapshot's path.
    pub async fn restore_backup(&self, name: &str) -> StrataResult<PathBuf> {
        check_name(name)?;
        let path = self.backup_dir.join(name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(StrataError::BackupNotFound(name.to_string()));
        }

        let safety_name = self.fresh_name("pre_restore").await?;
        let safety = self.create_backup(Some(&safety_name)).await?;
        info!(backup = %safety_name, "Created safety backup");

        self.store.restore_from_backup(&path).await?;
        info!(backup = %name, "Restored backup");
        Ok(safety)
    }

    /// Delete a snapshot and its index entry.
    pub async fn delete_backup(&self, name: &str) -> StrataResult<()> {
        check_name(name)?;
        let path = self.backup_dir.join(name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(StrataError::BackupNotFound(name.to_string()));
        }
        tokio::fs::remove_dir_all(&path).await?;

        let _guard = self.index_lock.lock().await;
        let mut index = self.load_index().await;
        if index.backups.remove(name).is_some() {
            index.last_updated = Some(Utc::now());
            self.save_index(&index).await?;
        }
        info!(backup = %name, "Deleted backup");
        Ok(())
    }

    /// Delete automatic snapshots that are older than `max_age_days`, or that
    /// exceed `keep_count` counting from the newest. Manual snapshots are
    /// never deleted. Returns the number deleted.
    pub async fn cleanup_old_backups(
        &self,
        keep_count: usize,
        max_age_days: i64,
    ) -> StrataResult<usize> {
        let mut backups = self.list_backups().await?;
        backups.reverse();
        let total = backups.len();
        let cutoff = Utc::now() - ChronoDuration::days(max_age_days);

        let mut deleted = 0;
        for backup in backups {
            if backup.metadata.backup_type != BackupType::Automatic {
                continue;
            }
            let too_old = backup.metadata.created < cutoff;
            let over_count = total - deleted > keep_count;
            if !(too_old || over_count) {
                continue;
            }
            match self.delete_backup(&backup.name).await {
                Ok(()) => deleted += 1,
                Err(e) => warn!(backup = %backup.name, error = %e, "Failed to delete old backup"),
            }
        }
        if deleted > 0 {
            info!(deleted, "Cleaned up old backups");
        }
        Ok(deleted)
    }

    /// Check that the sidecar decodes, every listed file is present, and
    /// every data file parses.
    pub async fn verify_backup(&self, name: &str) -> BackupVerification {
        let mut result = BackupVerification::default();
        if check_name(name).is_err() {
            return result;
        }
        let path = self.backup_dir.join(name);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return result;
        }
        result.exists = true;

        if let Err(e) = verify_into(&path, &mut result).await {
            warn!(backup = %name, error = %e, "Backup verification failed");
            result.error = Some(e.to_string());
            result.valid = false;
            return result;
        }

        let all_present = result
            .expected_files
            .iter()
            .all(|f| result.files_found.contains(f));
        result.valid =
            result.metadata_valid && all_present && result.json_valid.values().all(|ok| *ok);
        debug!(backup = %name, valid = result.valid, "Verified backup");
        result
    }

    /// Aggregate counts and sizes over listed snapshots.
    pub async fn get_backup_stats(&self) -> StrataResult<BackupStats> {
        let backups = self.list_backups().await?;
        let automatic = backups
            .iter()
            .filter(|b| b.metadata.backup_type == BackupType::Automatic)
            .count();
        Ok(BackupStats {
            total_backups: backups.len(),
            total_size: backups.iter().map(|b| b.metadata.size).sum(),
            automatic_backups: automatic,
            manual_backups: backups.len() - automatic,
            oldest_backup: backups.iter().map(|b| b.metadata.created).min(),
            newest_backup: backups.iter().map(|b| b.metadata.created).max(),
            backup_directory: self.backup_dir.clone(),
        })
    }

    /// `<prefix>_<YYYYmmdd_HHMMSS_mmm>`, suffixed if that directory exists.
    async fn fresh_name(&self, prefix: &str) -> StrataResult<String> {
        let base = format!("{prefix}_{}", Utc::now().format("%Y%m%d_%H%M%S_%3f"));
        let mut name = base.clone();
        let mut attempt = 1;
        while tokio::fs::try_exists(self.backup_dir.join(&name)).await? {
            name = format!("{base}_{attempt}");
            attempt += 1;
        }
        Ok(name)
    }

    async fn load_index(&self) -> BackupIndex {
        let path = self.backup_dir.join(INDEX_FILE);
        match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Backup index unreadable, starting fresh");
                BackupIndex::default()
            }),
            Err(_) => BackupIndex::default(),
        }
    }

    async fn save_index(&self, index: &BackupIndex) -> StrataResult<()> {
        let path = self.backup_dir.join(INDEX_FILE);
        let tmp = self.backup_dir.join(format!("{INDEX_FILE}.tmp"));
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(index)?).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

/// Snapshot names are single path components.
fn check_name(name: &str) -> StrataResult<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) if name != INDEX_FILE => Ok(()),
        _ => Err(StrataError::InvalidInput(format!(
            "Invalid backup name: {name}"
        ))),
    }
}

async fn verify_into(path: &Path, result: &mut BackupVerification) -> StrataResult<()> {
    match tokio::fs::read(path.join(METADATA_FILE)).await {
        Ok(bytes) => match serde_json::from_slice::<BackupMetadata>(&bytes) {
            Ok(metadata) => {
                result.metadata_valid = true;
                result.expected_files = metadata.files;
            }
            Err(_) => result.metadata_valid = false,
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => result.metadata_valid = false,
        Err(e) => return Err(e.into()),
    }

    let mut entries = tokio::fs::read_dir(path).await?;
    let mut found = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".json") && name != METADATA_FILE {
            found.push(name);
        }
    }
    found.sort();

    for name in &found {
        let bytes = tokio::fs::read(path.join(name)).await?;
        let parses = serde_json::from_slice::<Value>(&bytes).is_ok();
        result.json_valid.insert(name.clone(), parses);
    }
    result.files_found = found;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_types::config::LockConfig;
    use strata_types::document::Document;

    async fn setup() -> (tempfile::TempDir, Arc<DocumentStore>, SnapshotManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            DocumentStore::open(dir.path().join("data"), LockConfig::default())
                .await
                .unwrap(),
        );
        let snapshots = SnapshotManager::new(Arc::clone(&store)).await.unwrap();
        (dir, store, snapshots)
    }

    fn knowledge(tag: &str) -> Document {
        let mut doc = DocumentKind::Knowledge.default_document();
        doc.insert("facts".to_string(), json!({ "tag": tag }));
        doc
    }

    #[tokio::test]
    async fn test_create_writes_files_sidecar_and_index() {
        let (_dir, _store, snapshots) = setup().await;
        let path = snapshots.create_backup(None).await.unwrap();
        for kind in DocumentKind::ALL {
            assert!(path.join(kind.file_name()).exists());
        }
        assert!(path.join(METADATA_FILE).exists());

        let listed = snapshots.list_backups().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].name.starts_with("auto_backup_"));
        assert_eq!(listed[0].metadata.backup_type, BackupType::Automatic);
        assert_eq!(listed[0].metadata.files.len(), DocumentKind::ALL.len());
        assert!(listed[0].metadata.size > 0);
    }

    #[tokio::test]
    async fn test_named_backup_is_manual() {
        let (_dir, _store, snapshots) = setup().await;
        snapshots.create_backup(Some("before-upgrade")).await.unwrap();
        let listed = snapshots.list_backups().await.unwrap();
        assert_eq!(listed[0].metadata.backup_type, BackupType::Manual);
        assert!(snapshots.create_backup(Some("../escape")).await.is_err());
    }

    #[tokio::test]
    async fn test_existing_name_not_overwritten() {
        let (_dir, store, snapshots) = setup().await;
        store.write(DocumentKind::Knowledge, &knowledge("v1")).await.unwrap();
        let path = snapshots.create_backup(Some("golden")).await.unwrap();
        let before = std::fs::read(path.join(DocumentKind::Knowledge.file_name())).unwrap();

        store.write(DocumentKind::Knowledge, &knowledge("v2")).await.unwrap();
        let err = snapshots.create_backup(Some("golden")).await.unwrap_err();
        assert!(matches!(err, StrataError::InvalidInput(_)));

        let after = std::fs::read(path.join(DocumentKind::Knowledge.file_name())).unwrap();
        assert_eq!(before, after);
        assert_eq!(snapshots.list_backups().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_takes_safety_backup() {
        let (_dir, store, snapshots) = setup().await;
        store.write(DocumentKind::Knowledge, &knowledge("v1")).await.unwrap();
        snapshots.create_backup(Some("v1")).await.unwrap();
        store.write(DocumentKind::Knowledge, &knowledge("v2")).await.unwrap();

        let safety = snapshots.restore_backup("v1").await.unwrap();
        let doc = store.read(DocumentKind::Knowledge).await.unwrap();
        assert_eq!(doc["facts"]["tag"], "v1");

        let raw = std::fs::read_to_string(safety.join("knowledge.json")).unwrap();
        assert!(raw.contains("v2"));
        let names: Vec<String> = snapshots
            .list_backups()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert!(names.iter().any(|n| n.starts_with("pre_restore_")));
    }

    #[tokio::test]
    async fn test_restore_missing_backup() {
        let (_dir, _store, snapshots) = setup().await;
        let err = snapshots.restore_backup("nope").await.unwrap_err();
        assert!(matches!(err, StrataError::BackupNotFound(n) if n == "nope"));
    }

    #[tokio::test]
    async fn test_delete_removes_dir_and_index_entry() {
        let (_dir, _store, snapshots) = setup().await;
        let path = snapshots.create_backup(Some("gone")).await.unwrap();
        snapshots.delete_backup("gone").await.unwrap();
        assert!(!path.exists());
        assert!(snapshots.list_backups().await.unwrap().is_empty());
        assert!(snapshots.delete_backup("gone").await.is_err());
    }

    #[tokio::test]
    async fn test_cleanup_by_count_spares_manual() {
        let (_dir, _store, snapshots) = setup().await;
        for _ in 0..3 {
            snapshots.create_backup(None).await.unwrap();
        }
        snapshots.create_backup(Some("keep-me")).await.unwrap();

        let deleted = snapshots.cleanup_old_backups(2, 30).await.unwrap();
        assert_eq!(deleted, 2);
        let remaining = snapshots.list_backups().await.unwrap();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().any(|b| b.name == "keep-me"));
    }

    #[tokio::test]
    async fn test_cleanup_by_age() {
        let (_dir, _store, snapshots) = setup().await;
        snapshots.create_backup(None).await.unwrap();
        snapshots.create_backup(None).await.unwrap();

        let mut index = snapshots.load_index().await;
        let oldest = index.backups.keys().next().cloned().unwrap();
        if let Some(meta) = index.backups.get_mut(&oldest) {
            meta.created = Utc::now() - ChronoDuration::days(45);
        }
        snapshots.save_index(&index).await.unwrap();

        assert_eq!(snapshots.cleanup_old_backups(10, 30).await.unwrap(), 1);
        let remaining = snapshots.list_backups().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].name, oldest);
    }

    #[tokio::test]
    async fn test_verify_detects_corruption() {
        let (_dir, _store, snapshots) = setup().await;
        let path = snapshots.create_backup(Some("check")).await.unwrap();
        let ok = snapshots.verify_backup("check").await;
        assert!(ok.exists && ok.metadata_valid && ok.valid);
        assert_eq!(ok.files_found.len(), DocumentKind::ALL.len());

        std::fs::write(path.join("memory.json"), b"{broken").unwrap();
        let bad = snapshots.verify_backup("check").await;
        assert!(!bad.valid);
        assert_eq!(bad.json_valid.get("memory.json"), Some(&false));

        std::fs::remove_file(path.join("tools.json")).unwrap();
        std::fs::write(path.join("memory.json"), b"{}").unwrap();
        assert!(!snapshots.verify_backup("check").await.valid);

        assert!(!snapshots.verify_backup("absent").await.exists);
    }

    #[tokio::test]
    async fn test_stats() {
        let (_dir, _store, snapshots) = setup().await;
        snapshots.create_backup(None).await.unwrap();
        snapshots.create_backup(Some("manual")).await.unwrap();
        let stats = snapshots.get_backup_stats().await.unwrap();
        assert_eq!(stats.total_backups, 2);
        assert_eq!(stats.automatic_backups, 1);
        assert_eq!(stats.manual_backups, 1);
        assert!(stats.oldest_backup <= stats.newest_backup);
        assert_eq!(stats.backup_directory, snapshots.backup_dir());
    }
}
