//! Command implementations by domain.

pub mod backup;
pub mod hierarchy;
pub mod init;
pub mod memory;
pub mod system;

use crate::ui;
use std::future::Future;
use strata_memory::MemorySubstrate;
use strata_types::config::StrataConfig;
use strata_types::error::StrataError;
use tracing::debug;

/// Run `fut` to completion on a fresh runtime, exiting on runtime failure.
pub(crate) fn block_on<F: Future>(fut: F) -> F::Output {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt.block_on(fut),
        Err(e) => {
            ui::error(&format!("Failed to start async runtime: {e}"));
            std::process::exit(1);
        }
    }
}

/// Open the substrate (with the boot-time repair pass) or exit.
pub(crate) async fn open_substrate(config: &StrataConfig) -> MemorySubstrate {
    match MemorySubstrate::open(config).await {
        Ok(substrate) => substrate,
        Err(e) => fail(&e),
    }
}

/// Print a store error with a matching fix suggestion, then exit.
pub(crate) fn fail(e: &StrataError) -> ! {
    debug!(error = ?e, "Command failed");
    match e {
        StrataError::LockTimeout { path, .. } => ui::error_with_fix(
            &e.to_string(),
            &format!("Another process may hold {path}; remove it if that process is gone"),
        ),
        StrataError::BackupNotFound(_) => {
            ui::error_with_fix(&e.to_string(), "List snapshots with `strata backup list`")
        }
        StrataError::Io(_) => {
            ui::error_with_fix(&e.to_string(), "Check the data_dir setting and its permissions")
        }
        _ => ui::error(&e.to_string()),
    }
    std::process::exit(1);
}

/// Pretty-print `value` as JSON.
pub(crate) fn print_json(value: &impl serde::Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}
