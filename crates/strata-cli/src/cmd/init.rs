//! Init and foreground start.

use crate::cmd::{block_on, fail, open_substrate};
use crate::ui;
use std::path::{Path, PathBuf};
use strata_kernel::config::{default_config_path, load_config};
use strata_kernel::StrataKernel;
use strata_types::config::StrataConfig;
use strata_types::document::DocumentKind;

pub fn cmd_init(config: Option<PathBuf>, data_dir: Option<PathBuf>, force: bool) {
    let config_path = config.unwrap_or_else(default_config_path);

    ui::banner();
    ui::blank();

    if config_path.exists() && !force {
        ui::check_warn(&format!(
            "Config already exists: {} (use --force to overwrite)",
            config_path.display()
        ));
    } else {
        let mut fresh = StrataConfig::default();
        if let Some(dir) = data_dir {
            fresh.data_dir = dir;
        }
        if let Err(e) = write_config(&config_path, &fresh) {
            ui::error_with_fix(
                &format!("Failed to write {}", config_path.display()),
                &e,
            );
            std::process::exit(1);
        }
        ui::success(&format!("Created: {}", config_path.display()));
    }

    let config = load_config(Some(&config_path));
    block_on(async {
        let substrate = open_substrate(&config).await;
        for kind in DocumentKind::ALL {
            ui::check_ok(&format!("{}", substrate.store().path_for(kind).display()));
        }
    });

    ui::blank();
    ui::next_steps(&[
        "strata stats              Check what is stored",
        "strata start              Run with automatic backups",
        "strata backup create      Take a manual snapshot",
    ]);
}

fn write_config(path: &Path, config: &StrataConfig) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let body = toml::to_string_pretty(config).map_err(|e| e.to_string())?;
    std::fs::write(path, body).map_err(|e| e.to_string())
}

pub fn cmd_start(config: Option<PathBuf>) {
    let config = load_config(config.as_deref());

    ui::banner();
    ui::blank();

    block_on(async {
        let kernel = match StrataKernel::boot(config).await {
            Ok(k) => k,
            Err(strata_kernel::error::KernelError::Strata(e)) => fail(&e),
            Err(e) => {
                ui::error_with_fix(&e.to_string(), "Check your config.toml values");
                std::process::exit(1);
            }
        };

        ui::success("Kernel booted");
        ui::kv("Data", &kernel.config.data_dir.display().to_string());
        if kernel.config.backup.enabled {
            ui::kv_ok(
                "Backups",
                &format!("every {}s, keep {}", kernel.config.backup.interval_secs, kernel.config.backup.keep_count),
            );
        } else {
            ui::kv_warn("Backups", "disabled");
        }
        ui::blank();
        ui::hint("Press Ctrl+C to stop");

        if let Err(e) = tokio::signal::ctrl_c().await {
            ui::error(&format!("Failed to listen for Ctrl+C: {e}"));
        }

        ui::blank();
        match kernel.shutdown().await {
            Ok(path) => ui::success(&format!("Final snapshot: {}", path.display())),
            Err(e) => ui::error(&format!("Shutdown snapshot failed: {e}")),
        }
        let health = kernel.supervisor.health();
        ui::kv("Snapshots", &health.backups_taken.to_string());
        if health.backup_failures > 0 {
            ui::kv_warn("Failures", &health.backup_failures.to_string());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_written_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut config = StrataConfig::default();
        config.data_dir = dir.path().join("data");
        config.memory.max_memories = 42;

        write_config(&path, &config).unwrap();
        let loaded = load_config(Some(&path));
        assert_eq!(loaded.memory.max_memories, 42);
        assert_eq!(loaded.backup, config.backup);
    }
}
