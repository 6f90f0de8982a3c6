//! StrataKernel: boot sequence and graceful shutdown.

use crate::background::{run_backup_cycle, BackupScheduler};
use crate::error::{KernelError, KernelResult};
use crate::supervisor::Supervisor;
use std::path::PathBuf;
use std::sync::Arc;
use strata_memory::MemorySubstrate;
use strata_types::config::StrataConfig;
use tokio::sync::Mutex;
use tracing::info;

/// The running persistence layer: substrate, supervisor and backup loop.
pub struct StrataKernel {
    /// Effective configuration.
    pub config: StrataConfig,
    /// Store, validator, snapshots and hierarchy.
    pub substrate: Arc<MemorySubstrate>,
    /// Shutdown signal and health counters.
    pub supervisor: Arc<Supervisor>,
    scheduler: Mutex<Option<BackupScheduler>>,
}

impl StrataKernel {
    /// Boot the kernel.
    ///
    /// Opens the data directory, validates and repairs every document, loads
    /// the agent hierarchy and, if enabled, starts the backup loop.
    pub async fn boot(config: StrataConfig) -> KernelResult<Self> {
        check_config(&config)?;
        info!(data_dir = %config.data_dir.display(), "Booting Strata kernel");

        let substrate = Arc::new(MemorySubstrate::open(&config).await?);
        let supervisor = Arc::new(Supervisor::new());
        let scheduler = config.backup.enabled.then(|| {
            BackupScheduler::start(
                Arc::clone(&substrate),
                Arc::clone(&supervisor),
                config.backup.clone(),
            )
        });

        info!(backups = config.backup.enabled, "Strata kernel booted");
        Ok(Self {
            config,
            substrate,
            supervisor,
            scheduler: Mutex::new(scheduler),
        })
    }

    /// Whether the background backup loop is running.
    pub async fn backups_running(&self) -> bool {
        self.scheduler
            .lock()
            .await
            .as_ref()
            .is_some_and(|s| !s.is_finished())
    }

    /// Stop the backup loop, then take a final snapshot and apply retention.
    ///
    /// Returns the final snapshot's path. Calling it twice takes two
    /// snapshots; the loop is only stopped once.
    pub async fn shutdown(&self) -> KernelResult<PathBuf> {
        self.supervisor.shutdown();
        if let Some(scheduler) = self.scheduler.lock().await.take() {
            scheduler.join().await;
        }

        let (path, pruned) = run_backup_cycle(self.substrate.snapshots(), &self.config.backup).await?;
        info!(path = %path.display(), pruned, "Strata kernel stopped");
        Ok(path)
    }
}

fn check_config(config: &StrataConfig) -> KernelResult<()> {
    if config.data_dir.as_os_str().is_empty() {
        return Err(KernelError::BootFailed("data_dir is empty".to_string()));
    }
    if config.memory.max_memories == 0 {
        return Err(KernelError::BootFailed(
            "memory.max_memories must be at least 1".to_string(),
        ));
    }
    Ok(())
}
