//! Snapshot management commands.

use crate::cmd::{block_on, fail, open_substrate, print_json};
use crate::table::Table;
use crate::ui;
use std::path::PathBuf;
use strata_kernel::config::load_config;

pub fn cmd_backup_create(config: Option<PathBuf>, name: Option<String>) {
    let config = load_config(config.as_deref());
    block_on(async {
        let substrate = open_substrate(&config).await;
        match substrate.snapshots().create_backup(name.as_deref()).await {
            Ok(path) => ui::success(&format!("Snapshot created: {}", path.display())),
            Err(e) => fail(&e),
        }
    });
}

pub fn cmd_backup_list(config: Option<PathBuf>, json: bool) {
    let config = load_config(config.as_deref());
    block_on(async {
        let substrate = open_substrate(&config).await;
        let backups = match substrate.snapshots().list_backups().await {
            Ok(b) => b,
            Err(e) => fail(&e),
        };
        if json {
            print_json(&backups);
            return;
        }
        if backups.is_empty() {
            ui::check_warn("No snapshots yet");
            ui::hint("Take one with `strata backup create <name>`");
            return;
        }

        let mut table = Table::new(&["Name", "Type", "Created", "Files", "Size"])
            .right(3)
            .right(4);
        for backup in &backups {
            table.add_row([
                backup.name.clone(),
                backup.metadata.backup_type.as_str().to_string(),
                ui::format_time(&backup.metadata.created),
                backup.metadata.files.len().to_string(),
                ui::format_bytes(backup.metadata.size),
            ]);
        }
        table.print();
    });
}

pub fn cmd_backup_restore(config: Option<PathBuf>, name: &str) {
    let config = load_config(config.as_deref());
    block_on(async {
        let substrate = open_substrate(&config).await;
        match substrate.snapshots().restore_backup(name).await {
            Ok(safety) => {
                ui::success(&format!("Restored snapshot '{name}'"));
                ui::kv("Safety copy", &safety.display().to_string());
            }
            Err(e) => fail(&e),
        }
    });
}

pub fn cmd_backup_verify(config: Option<PathBuf>, name: &str, json: bool) {
    let config = load_config(config.as_deref());
    let valid = block_on(async {
        let substrate = open_substrate(&config).await;
        let report = substrate.snapshots().verify_backup(name).await;
        if json {
            print_json(&report);
            return report.valid;
        }

        ui::section(&format!("Verify {name}"));
        if !report.exists {
            ui::check_fail("Snapshot directory not found");
            return false;
        }
        if report.metadata_valid {
            ui::check_ok("Metadata readable");
        } else {
            ui::check_fail("Metadata missing or unreadable");
        }
        ui::kv(
            "Files",
            &format!("{}/{} present", report.files_found.len(), report.expected_files.len()),
        );
        for (file, ok) in &report.json_valid {
            if *ok {
                ui::check_ok(file);
            } else {
                ui::check_fail(&format!("{file}: not valid JSON"));
            }
        }
        if let Some(err) = &report.error {
            ui::check_fail(err);
        }
        if report.valid {
            ui::success("Snapshot is valid");
        }
        report.valid
    });

    if !valid {
        std::process::exit(1);
    }
}

pub fn cmd_backup_delete(config: Option<PathBuf>, name: &str) {
    let config = load_config(config.as_deref());
    block_on(async {
        let substrate = open_substrate(&config).await;
        match substrate.snapshots().delete_backup(name).await {
            Ok(()) => ui::success(&format!("Deleted snapshot '{name}'")),
            Err(e) => fail(&e),
        }
    });
}

pub fn cmd_backup_cleanup(config: Option<PathBuf>, keep: Option<usize>, max_age_days: Option<i64>) {
    let config = load_config(config.as_deref());
    let keep = keep.unwrap_or(config.backup.keep_count);
    let max_age_days = max_age_days.unwrap_or(config.backup.max_age_days);
    block_on(async {
        let substrate = open_substrate(&config).await;
        match substrate.snapshots().cleanup_old_backups(keep, max_age_days).await {
            Ok(0) => ui::check_ok("Nothing to clean up"),
            Ok(n) => ui::success(&format!("Removed {n} automatic snapshot(s)")),
            Err(e) => fail(&e),
        }
    });
}
