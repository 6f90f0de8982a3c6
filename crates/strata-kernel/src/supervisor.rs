//! Process supervision: graceful shutdown signal and backup health counters.

use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{info, warn};

/// Shutdown signal manager with health monitoring.
pub struct Supervisor {
    /// Send side of the shutdown signal.
    shutdown_tx: watch::Sender<bool>,
    /// Receive side of the shutdown signal (clonable).
    shutdown_rx: watch::Receiver<bool>,
    /// Automatic snapshots taken by the background loop.
    backups_taken: AtomicU64,
    /// Automatic snapshot attempts that failed.
    backup_failures: AtomicU64,
}

impl Supervisor {
    /// Create a new supervisor.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            shutdown_tx: tx,
            shutdown_rx: rx,
            backups_taken: AtomicU64::new(0),
            backup_failures: AtomicU64::new(0),
        }
    }

    /// Get a receiver that will be notified on shutdown.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        info!("Supervisor: initiating graceful shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn record_backup(&self) {
        self.backups_taken.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed automatic snapshot.
    pub fn record_backup_failure(&self) {
        self.backup_failures.fetch_add(1, Ordering::Relaxed);
        warn!(
            total_failures = self.backup_failures.load(Ordering::Relaxed),
            "Automatic backup failure recorded"
        );
    }

    pub fn backups_taken(&self) -> u64 {
        self.backups_taken.load(Ordering::Relaxed)
    }

    pub fn backup_failures(&self) -> u64 {
        self.backup_failures.load(Ordering::Relaxed)
    }

    /// Get a health summary.
    pub fn health(&self) -> SupervisorHealth {
        SupervisorHealth {
            is_shutting_down: self.is_shutting_down(),
            backups_taken: self.backups_taken(),
            backup_failures: self.backup_failures(),
        }
    }
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new()
    }
}

/// Health report from the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorHealth {
    pub is_shutting_down: bool,
    pub backups_taken: u64,
    pub backup_failures: u64,
}
