//! Leased advisory lock files.
//!
//! A lock is a `<name>.lock` file created exclusively and holding a JSON
//! lease. Leases expire, so a process that dies while holding one cannot
//! block other processes for longer than the lease TTL.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};
use strata_types::config::LockConfig;
use strata_types::error::{StrataError, StrataResult};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Contents of a lock file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    /// Unique id of the holder.
    pub owner: String,
    /// Process id of the holder.
    pub pid: u32,
    /// When the lease was taken.
    pub acquired_at: DateTime<Utc>,
    /// When other processes may reclaim it.
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    fn new(owner: String, ttl: std::time::Duration) -> Self {
        let now = Utc::now();
        let ttl = ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(30));
        Self {
            owner,
            pid: std::process::id(),
            acquired_at: now,
            expires_at: now + ttl,
        }
    }

    /// Whether the lease has run out.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// A held lock. Released explicitly with [`LockGuard::release`], or on drop.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    owner: String,
    released: bool,
}

impl LockGuard {
    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lock file if it still carries this holder's lease.
    pub async fn release(mut self) {
        self.released = true;
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                if owned_by(&bytes, &self.owner) {
                    if let Err(e) = tokio::fs::remove_file(&self.path).await {
                        warn!(path = %self.path.display(), error = %e, "Failed to remove lock file");
                    }
                } else {
                    warn!(path = %self.path.display(), "Lock was reclaimed by another holder");
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Lock file vanished before release");
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read lock file");
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // Abandoned holder (cancelled future or early return).
        if let Ok(bytes) = std::fs::read(&self.path) {
            if owned_by(&bytes, &self.owner) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}

fn owned_by(bytes: &[u8], owner: &str) -> bool {
    serde_json::from_slice::<Lease>(bytes)
        .map(|lease| lease.owner == owner)
        .unwrap_or(false)
}

/// Acquire the lock at `path` for `owner`, polling until `acquire_timeout`.
pub async fn acquire(path: &Path, owner: &str, config: &LockConfig) -> StrataResult<LockGuard> {
    let started = Instant::now();
    loop {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await
        {
            Ok(mut file) => {
                let lease = Lease::new(owner.to_string(), config.lease_ttl());
                let bytes = serde_json::to_vec(&lease)?;
                let written = match file.write_all(&bytes).await {
                    Ok(()) => file.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    let _ = tokio::fs::remove_file(path).await;
                    return Err(StrataError::Io(e));
                }
                debug!(path = %path.display(), "Acquired lock");
                return Ok(LockGuard {
                    path: path.to_path_buf(),
                    owner: lease.owner,
                    released: false,
                });
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                if reclaim_if_stale(path, config).await {
                    continue;
                }
            }
            Err(e) => return Err(StrataError::Io(e)),
        }

        let waited = started.elapsed();
        if waited >= config.acquire_timeout() {
            return Err(StrataError::LockTimeout {
                path: path.display().to_string(),
                waited_ms: waited.as_millis() as u64,
            });
        }
        tokio::time::sleep(config.poll_interval()).await;
    }
}

/// Remove an expired or long-undecodable lease. Returns whether it did.
async fn reclaim_if_stale(path: &Path, config: &LockConfig) -> bool {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        // Released between our open and our read; retry right away.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return true,
        Err(_) => return false,
    };

    let stale = match serde_json::from_slice::<Lease>(&bytes) {
        Ok(lease) => {
            let expired = lease.is_expired(Utc::now());
            if expired {
                warn!(
                    path = %path.display(),
                    owner = %lease.owner,
                    pid = lease.pid,
                    expired_at = %lease.expires_at,
                    "Reclaiming expired lock"
                );
            }
            expired
        }
        // A holder may be between create and write; only reclaim old files.
        Err(_) => {
            let old = file_age(path)
                .await
                .map(|age| age >= config.lease_ttl())
                .unwrap_or(false);
            if old {
                warn!(path = %path.display(), "Reclaiming unreadable lock file");
            }
            old
        }
    };

    if !stale {
        return false;
    }
    match tokio::fs::remove_file(path).await {
        Ok(()) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(_) => false,
    }
}

async fn file_age(path: &Path) -> Option<std::time::Duration> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    SystemTime::now().duration_since(modified).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> LockConfig {
        LockConfig {
            lease_ttl_ms: 30_000,
            acquire_timeout_ms: 100,
            poll_interval_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.lock");
        let guard = acquire(&path, "a", &fast_config()).await.unwrap();
        assert!(path.exists());
        guard.release().await;
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_contended_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.lock");
        let _held = acquire(&path, "a", &fast_config()).await.unwrap();
        let err = acquire(&path, "b", &fast_config()).await.unwrap_err();
        assert!(matches!(err, StrataError::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn test_expired_lease_is_reclaimed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.lock");
        let dead = Lease {
            owner: "crashed".to_string(),
            pid: 1,
            acquired_at: Utc::now() - ChronoDuration::minutes(10),
            expires_at: Utc::now() - ChronoDuration::minutes(9),
        };
        std::fs::write(&path, serde_json::to_vec(&dead).unwrap()).unwrap();

        let guard = acquire(&path, "fresh", &fast_config()).await.unwrap();
        let lease: Lease = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(lease.owner, "fresh");
        guard.release().await;
    }

    #[tokio::test]
    async fn test_fresh_garbage_lock_is_respected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.lock");
        std::fs::write(&path, b"").unwrap();
        let err = acquire(&path, "b", &fast_config()).await.unwrap_err();
        assert!(matches!(err, StrataError::LockTimeout { .. }));
    }

    #[tokio::test]
    async fn test_release_leaves_foreign_lease() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.lock");
        let guard = acquire(&path, "a", &fast_config()).await.unwrap();
        let other = Lease::new("b".to_string(), std::time::Duration::from_secs(30));
        std::fs::write(&path, serde_json::to_vec(&other).unwrap()).unwrap();
        guard.release().await;
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.lock");
        {
            let _guard = acquire(&path, "a", &fast_config()).await.unwrap();
        }
        assert!(!path.exists());
    }
}
