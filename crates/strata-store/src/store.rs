//! One JSON file per document kind, replaced atomically.
//!
//! Every operation on a document runs inside that document's critical
//! section: an in-process `tokio::sync::Mutex` plus a leased lock file for
//! other processes. Operations on different documents run independently.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use strata_types::config::LockConfig;
use strata_types::document::{Document, DocumentKind};
use strata_types::error::{StrataError, StrataResult};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::lock::{self, LockGuard};
use crate::merge::{deep_merge, matches_query};

/// Retention used by [`DocumentStore::close`].
const CLOSE_KEEP_BACKUPS: usize = 10;

/// Size and modification time of one data file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileStats {
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Store-wide file statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoreStats {
    pub storage_path: PathBuf,
    pub files: BTreeMap<String, FileStats>,
    pub total_size: u64,
}

/// Durable store for the fixed set of [`DocumentKind`]s.
pub struct DocumentStore {
    data_dir: PathBuf,
    lock_config: LockConfig,
    owner: String,
    sections: HashMap<DocumentKind, Mutex<()>>,
}

impl DocumentStore {
    /// Open the store at `data_dir`, creating the directory and writing the
    /// default skeleton for every document that has neither a file nor a
    /// `.backup`.
    pub async fn open(data_dir: impl Into<PathBuf>, lock_config: LockConfig) -> StrataResult<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir).await?;

        let store = Self {
            data_dir,
            lock_config,
            owner: format!("{}-{}", std::process::id(), Uuid::new_v4()),
            sections: DocumentKind::ALL
                .iter()
                .map(|kind| (*kind, Mutex::new(())))
                .collect(),
        };

        for kind in DocumentKind::ALL {
            let present = tokio::fs::try_exists(store.path_for(kind)).await?
                || tokio::fs::try_exists(store.sibling(kind, "backup")).await?;
            if !present {
                store.write(kind, &kind.default_document()).await?;
                info!(document = %kind, "Initialized document");
            }
        }

        info!(path = %store.data_dir.display(), "Document store opened");
        Ok(store)
    }

    /// Directory holding the data files.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Directory holding snapshots.
    pub fn backups_dir(&self) -> PathBuf {
        self.data_dir.join("backups")
    }

    /// Canonical file of a document.
    pub fn path_for(&self, kind: DocumentKind) -> PathBuf {
        self.data_dir.join(kind.file_name())
    }

    fn sibling(&self, kind: DocumentKind, ext: &str) -> PathBuf {
        self.data_dir.join(format!("{}.{ext}", kind.as_str()))
    }

    async fn enter(&self, kind: DocumentKind) -> StrataResult<(MutexGuard<'_, ()>, LockGuard)> {
        let section = self
            .sections
            .get(&kind)
            .ok_or_else(|| StrataError::Internal(format!("No critical section for {kind}")))?
            .lock()
            .await;
        let owner = format!("{}:{}", self.owner, Uuid::new_v4());
        let guard = lock::acquire(&self.sibling(kind, "lock"), &owner, &self.lock_config).await?;
        Ok((section, guard))
    }

    /// Read a document.
    ///
    /// Malformed content never surfaces as an error: the `.backup` copy is
    /// tried next, and the default skeleton is the last resort.
    pub async fn read(&self, kind: DocumentKind) -> StrataResult<Document> {
        let (_section, guard) = self.enter(kind).await?;
        let result = self.load(kind).await;
        guard.release().await;
        result
    }

    /// Atomically replace a document.
    pub async fn write(&self, kind: DocumentKind, doc: &Document) -> StrataResult<()> {
        let (_section, guard) = self.enter(kind).await?;
        let result = self.persist(kind, doc, true).await;
        guard.release().await;
        result
    }

    /// Read-modify-write a document in one critical section.
    ///
    /// The document is persisted only if `f` succeeds.
    pub async fn modify<F, R>(&self, kind: DocumentKind, f: F) -> StrataResult<R>
    where
        F: FnOnce(&mut Document) -> StrataResult<R> + Send,
        R: Send,
    {
        let (_section, guard) = self.enter(kind).await?;
        let result = self.modify_locked(kind, f).await;
        guard.release().await;
        result
    }

    async fn modify_locked<F, R>(&self, kind: DocumentKind, f: F) -> StrataResult<R>
    where
        F: FnOnce(&mut Document) -> StrataResult<R> + Send,
        R: Send,
    {
        let mut doc = self.load(kind).await?;
        let out = f(&mut doc)?;
        self.persist(kind, &doc, true).await?;
        Ok(out)
    }

    /// Deep-merge `partial` into a document.
    pub async fn update(&self, kind: DocumentKind, partial: Document) -> StrataResult<()> {
        self.modify(kind, move |doc| {
            deep_merge(doc, partial);
            Ok(())
        })
        .await
    }

    /// Append `item` to the list at `key`, creating the list if absent.
    /// Returns the new list length.
    pub async fn append(&self, kind: DocumentKind, key: &str, item: Value) -> StrataResult<usize> {
        self.modify(kind, move |doc| {
            let slot = doc
                .entry(key.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match slot {
                Value::Array(items) => {
                    items.push(item);
                    Ok(items.len())
                }
                _ => Err(StrataError::NotAList {
                    document: kind.to_string(),
                    key: key.to_string(),
                }),
            }
        })
        .await
    }

    /// Remove the whole `key`, or with a predicate, drop the list items it
    /// accepts. Returns how many keys or items were removed.
    pub async fn remove(
        &self,
        kind: DocumentKind,
        key: &str,
        predicate: Option<&(dyn Fn(&Value) -> bool + Sync)>,
    ) -> StrataResult<usize> {
        self.modify(kind, move |doc| match predicate {
            None => Ok(usize::from(doc.remove(key).is_some())),
            Some(pred) => match doc.get_mut(key) {
                None => Ok(0),
                Some(Value::Array(items)) => {
                    let before = items.len();
                    items.retain(|item| !pred(item));
                    Ok(before - items.len())
                }
                Some(_) => Err(StrataError::NotAList {
                    document: kind.to_string(),
                    key: key.to_string(),
                }),
            },
        })
        .await
    }

    /// Scan every top-level list for items matching `query`.
    pub async fn search(
        &self,
        kind: DocumentKind,
        query: &Map<String, Value>,
    ) -> StrataResult<Vec<Value>> {
        let doc = self.read(kind).await?;
        let results: Vec<Value> = doc
            .values()
            .filter_map(Value::as_array)
            .flatten()
            .filter(|item| matches_query(item, query))
            .cloned()
            .collect();
        debug!(document = %kind, hits = results.len(), "Search complete");
        Ok(results)
    }

    /// Size and modification time of every data file.
    pub async fn get_stats(&self) -> StrataResult<StoreStats> {
        let mut files = BTreeMap::new();
        let mut total_size = 0;
        for kind in DocumentKind::ALL {
            let stats = match tokio::fs::metadata(self.path_for(kind)).await {
                Ok(meta) => FileStats {
                    size: meta.len(),
                    modified: meta.modified().ok().map(DateTime::<Utc>::from),
                },
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => FileStats {
                    size: 0,
                    modified: None,
                },
                Err(e) => return Err(e.into()),
            };
            total_size += stats.size;
            files.insert(kind.to_string(), stats);
        }
        Ok(StoreStats {
            storage_path: self.data_dir.clone(),
            files,
            total_size,
        })
    }

    /// Copy every document into a fresh `backup_<timestamp>` directory under
    /// `dir` (default: the store's `backups/`). Returns the new directory.
    pub async fn backup_all(&self, dir: Option<&Path>) -> StrataResult<PathBuf> {
        let parent = dir.map(Path::to_path_buf).unwrap_or_else(|| self.backups_dir());
        tokio::fs::create_dir_all(&parent).await?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f").to_string();
        let target = create_unique_dir(&parent, &format!("backup_{stamp}")).await?;

        for kind in DocumentKind::ALL {
            let doc = self.read(kind).await?;
            let bytes = serde_json::to_vec_pretty(&doc)?;
            tokio::fs::write(target.join(kind.file_name()), bytes).await?;
        }
        info!(path = %target.display(), "Created store backup");
        Ok(target)
    }

    /// Write back every `<name>.json` found in `path`.
    ///
    /// All files are decoded before any document is replaced.
    pub async fn restore_from_backup(&self, path: &Path) -> StrataResult<Vec<DocumentKind>> {
        if !tokio::fs::try_exists(path).await? {
            return Err(StrataError::BackupNotFound(path.display().to_string()));
        }
        let mut staged = Vec::new();
        for kind in DocumentKind::ALL {
            let file = path.join(kind.file_name());
            let raw = match tokio::fs::read_to_string(&file).await {
                Ok(raw) => raw,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let doc = decode_document(&raw)
                .map_err(|e| StrataError::Decode(format!("{}: {e}", file.display())))?;
            staged.push((kind, doc));
        }

        let mut restored = Vec::with_capacity(staged.len());
        for (kind, doc) in staged {
            self.write(kind, &doc).await?;
            restored.push(kind);
        }
        info!(path = %path.display(), documents = restored.len(), "Restored from backup");
        Ok(restored)
    }

    /// Remove `backup_*` directories beyond the newest `keep_count`.
    pub async fn cleanup_old_backups(&self, keep_count: usize) -> StrataResult<usize> {
        let dir = self.backups_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let meta = entry.metadata().await?;
            if meta.is_dir() && name.starts_with("backup_") {
                found.push((name, meta.modified().ok(), entry.path()));
            }
        }
        // Newest first; names carry the timestamp and break ties.
        found.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

        let mut removed = 0;
        for (_, _, path) in found.into_iter().skip(keep_count) {
            tokio::fs::remove_dir_all(&path).await?;
            debug!(path = %path.display(), "Removed old store backup");
            removed += 1;
        }
        Ok(removed)
    }

    /// Take a final backup and prune old ones.
    pub async fn close(&self) -> StrataResult<PathBuf> {
        let path = self.backup_all(None).await?;
        self.cleanup_old_backups(CLOSE_KEEP_BACKUPS).await?;
        info!(path = %self.data_dir.display(), "Document store closed");
        Ok(path)
    }

    /// Load a document. Caller must hold the critical section.
    async fn load(&self, kind: DocumentKind) -> StrataResult<Document> {
        let canonical = self.path_for(kind);
        let mut damaged = false;
        match read_document(&canonical).await {
            Ok(Some(doc)) => return Ok(doc),
            Ok(None) => {}
            Err(reason) => {
                warn!(document = %kind, error = %reason, "Document unreadable, trying backup");
                damaged = true;
            }
        }

        match read_document(&self.sibling(kind, "backup")).await {
            Ok(Some(doc)) => {
                if damaged {
                    warn!(document = %kind, "Recovered document from backup");
                } else {
                    info!(document = %kind, "Canonical file missing, recovered from backup");
                }
                self.persist(kind, &doc, false).await?;
                return Ok(doc);
            }
            Ok(None) => {}
            Err(reason) => {
                warn!(document = %kind, error = %reason, "Backup unreadable");
                damaged = true;
            }
        }

        let doc = kind.default_document();
        if damaged {
            error!(
                document = %kind,
                "Document and backup both unreadable, falling back to empty default"
            );
        } else {
            self.persist(kind, &doc, false).await?;
        }
        Ok(doc)
    }

    /// Atomic replace: current file to `.backup` (when `displace`), new
    /// content to `.tmp` and forced to disk, then `.tmp` renamed onto the
    /// canonical path.
    async fn persist(&self, kind: DocumentKind, doc: &Document, displace: bool) -> StrataResult<()> {
        let canonical = self.path_for(kind);
        let tmp = self.sibling(kind, "tmp");
        let bytes = serde_json::to_vec_pretty(doc)?;

        if displace && tokio::fs::try_exists(&canonical).await? {
            tokio::fs::rename(&canonical, self.sibling(kind, "backup")).await?;
        }

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &canonical).await?;
        sync_dir(&self.data_dir).await;
        debug!(document = %kind, bytes = bytes.len(), "Document written");
        Ok(())
    }
}

/// `Ok(None)` when the file does not exist; `Err` when it cannot be used.
async fn read_document(path: &Path) -> Result<Option<Document>, String> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) => decode_document(&raw).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.to_string()),
    }
}

fn decode_document(raw: &str) -> Result<Document, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("top-level value is not an object".to_string()),
        Err(e) => Err(e.to_string()),
    }
}

async fn create_unique_dir(parent: &Path, base: &str) -> StrataResult<PathBuf> {
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            base.to_string()
        } else {
            format!("{base}_{attempt}")
        };
        let path = parent.join(name);
        match tokio::fs::create_dir(&path).await {
            Ok(()) => return Ok(path),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => attempt += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) {
    if let Ok(handle) = tokio::fs::File::open(dir).await {
        let _ = handle.sync_all().await;
    }
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) {}
