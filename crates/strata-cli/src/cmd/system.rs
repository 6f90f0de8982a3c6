//! Validation and statistics commands.

use crate::cmd::{block_on, fail, print_json};
use crate::table::Table;
use crate::ui;
use std::path::PathBuf;
use strata_kernel::config::load_config;
use strata_memory::MemorySubstrate;

pub fn cmd_validate(config: Option<PathBuf>, repair: bool, json: bool) {
    let config = load_config(config.as_deref());
    let healthy = block_on(async {
        let substrate = match MemorySubstrate::open_without_repair(&config).await {
            Ok(s) => s,
            Err(e) => fail(&e),
        };
        let outcomes = match substrate.validate_all(repair).await {
            Ok(o) => o,
            Err(e) => fail(&e),
        };

        if json {
            let body: Vec<serde_json::Value> = outcomes
                .iter()
                .map(|(kind, o)| {
                    serde_json::json!({
                        "document": kind.as_str(),
                        "valid": o.report.valid,
                        "repaired": o.repaired,
                        "persisted": o.repaired && repair,
                        "errors": o.report.errors,
                        "original_errors": o.original_errors,
                        "warnings": o.report.warnings,
                    })
                })
                .collect();
            print_json(&body);
        } else {
            ui::section(if repair { "Validate and repair" } else { "Validate" });
            for (kind, outcome) in &outcomes {
                if outcome.repaired {
                    let verb = if repair { "repaired" } else { "repairable" };
                    ui::check_warn(&format!(
                        "{kind}: {verb} ({} issue(s))",
                        outcome.original_errors.len()
                    ));
                    for err in &outcome.original_errors {
                        println!("      {err}");
                    }
                } else if outcome.is_healthy() {
                    ui::check_ok(&format!("{kind}: valid"));
                } else {
                    ui::check_fail(&format!("{kind}: invalid"));
                    for err in &outcome.report.errors {
                        println!("      {err}");
                    }
                }
                for warning in &outcome.report.warnings {
                    println!("      warning: {warning}");
                }
            }
            if !repair && outcomes.iter().any(|(_, o)| o.repaired) {
                ui::blank();
                ui::hint("Run `strata validate --repair` to write the fixes");
            }
        }

        outcomes
            .iter()
            .all(|(_, o)| o.is_healthy() && (repair || !o.repaired))
    });

    if !healthy {
        std::process::exit(1);
    }
}

pub fn cmd_stats(config: Option<PathBuf>, json: bool) {
    let config = load_config(config.as_deref());
    block_on(async {
        let substrate = match MemorySubstrate::open_without_repair(&config).await {
            Ok(s) => s,
            Err(e) => fail(&e),
        };
        let store_stats = match substrate.store().get_stats().await {
            Ok(s) => s,
            Err(e) => fail(&e),
        };
        let backup_stats = match substrate.snapshots().get_backup_stats().await {
            Ok(s) => s,
            Err(e) => fail(&e),
        };
        let hierarchy = substrate.hierarchy().get_stats().await;

        if json {
            print_json(&serde_json::json!({
                "storage": store_stats,
                "hierarchy": hierarchy,
                "backups": backup_stats,
            }));
            return;
        }

        ui::section("Storage");
        ui::kv("Path", &store_stats.storage_path.display().to_string());
        let mut files = Table::new(&["File", "Size", "Modified"]).right(1);
        for (name, file) in &store_stats.files {
            files.add_row([
                name.clone(),
                ui::format_bytes(file.size),
                file.modified.as_ref().map(ui::format_time).unwrap_or_default(),
            ]);
        }
        files.print();
        ui::kv("Total", &ui::format_bytes(store_stats.total_size));

        ui::blank();
        ui::section("Hierarchy");
        ui::kv("Agents", &hierarchy.total_agents.to_string());
        ui::kv("Roots", &hierarchy.root_agents.to_string());
        ui::kv("Max depth", &hierarchy.max_depth.to_string());

        ui::blank();
        ui::section("Backups");
        ui::kv("Snapshots", &format!(
            "{} ({} automatic, {} manual)",
            backup_stats.total_backups, backup_stats.automatic_backups, backup_stats.manual_backups
        ));
        ui::kv("Size", &ui::format_bytes(backup_stats.total_size));
        match backup_stats.newest_backup {
            Some(newest) => ui::kv("Newest", &ui::format_time(&newest)),
            None => ui::kv_warn("Newest", "none yet"),
        }
    });
}
