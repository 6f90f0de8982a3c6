//! Background backup loop: periodic automatic snapshots with retention.
//!
//! The loop sleeps for the configured interval, takes an automatic snapshot,
//! then prunes old automatic snapshots. A failed cycle is retried after the
//! shorter retry delay. The loop exits when the supervisor signals shutdown.

use crate::supervisor::Supervisor;
use std::path::PathBuf;
use std::sync::Arc;
use strata_memory::MemorySubstrate;
use strata_store::SnapshotManager;
use strata_types::config::BackupConfig;
use strata_types::error::StrataResult;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Owns the running backup loop.
pub struct BackupScheduler {
    handle: JoinHandle<()>,
}

impl BackupScheduler {
    /// Spawn the loop on the current runtime.
    pub fn start(
        substrate: Arc<MemorySubstrate>,
        supervisor: Arc<Supervisor>,
        config: BackupConfig,
    ) -> Self {
        let mut shutdown = supervisor.subscribe();
        info!(
            interval_secs = config.interval_secs,
            keep = config.keep_count,
            "Starting backup loop"
        );

        let handle = tokio::spawn(async move {
            let mut delay = config.interval();
            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown.changed() => {
                        info!("Backup loop: shutdown signal received");
                        break;
                    }
                }

                match run_backup_cycle(substrate.snapshots(), &config).await {
                    Ok((path, pruned)) => {
                        debug!(path = %path.display(), pruned, "Backup loop: cycle complete");
                        supervisor.record_backup();
                        delay = config.interval();
                    }
                    Err(e) => {
                        warn!(error = %e, "Backup loop: snapshot failed, retrying later");
                        supervisor.record_backup_failure();
                        delay = config.retry_delay();
                    }
                }
            }
        });

        Self { handle }
    }

    /// Wait for the loop to exit. Call after signalling shutdown.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!(error = %e, "Backup loop ended abnormally");
        }
    }

    /// Whether the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Take one automatic snapshot, then apply retention.
///
/// Returns the snapshot path and how many old snapshots were removed.
pub async fn run_backup_cycle(
    snapshots: &SnapshotManager,
    config: &BackupConfig,
) -> StrataResult<(PathBuf, usize)> {
    let path = snapshots.create_backup(None).await?;
    let pruned = snapshots
        .cleanup_old_backups(config.keep_count, config.max_age_days)
        .await?;
    Ok((path, pruned))
}
