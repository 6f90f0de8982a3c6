//! Memory inspection commands.

use crate::cmd::{block_on, open_substrate, print_json};
use crate::table::Table;
use crate::ui;
use std::path::PathBuf;
use strata_kernel::config::load_config;
use strata_types::memory::{MemoryEntry, MemoryKind};

const PREVIEW_CHARS: usize = 60;

pub fn cmd_memory_search(
    config: Option<PathBuf>,
    agent: &str,
    query: &str,
    kind: Option<&str>,
    limit: usize,
    json: bool,
) {
    let kind = match kind.map(str::parse::<MemoryKind>).transpose() {
        Ok(k) => k,
        Err(e) => {
            ui::error_with_fix(&e.to_string(), "Use one of: interaction, fact, skill, experience");
            std::process::exit(1);
        }
    };

    let config = load_config(config.as_deref());
    block_on(async {
        let substrate = open_substrate(&config).await;
        let hits = substrate.ledger(agent).search(query, kind, limit).await;
        if json {
            print_json(&hits);
            return;
        }
        if hits.is_empty() {
            ui::check_warn(&format!("No memories match '{query}'"));
            return;
        }

        let mut table = Table::new(&["Agent", "Type", "Importance", "Accessed", "Content"])
            .right(2)
            .right(3);
        for entry in &hits {
            table.add_row([
                entry.agent_id.clone(),
                entry.kind.as_str().to_string(),
                format!("{:.2}", entry.importance),
                entry.access_count.to_string(),
                preview(entry),
            ]);
        }
        table.print();
    });
}

pub fn cmd_memory_stats(config: Option<PathBuf>, agent: &str, json: bool) {
    let config = load_config(config.as_deref());
    block_on(async {
        let substrate = open_substrate(&config).await;
        let stats = substrate.ledger(agent).stats().await;
        if json {
            print_json(&stats);
            return;
        }

        ui::section(&format!("Memories of {agent}"));
        ui::kv("Interactions", &stats.interactions.to_string());
        ui::kv("Facts", &stats.facts.to_string());
        ui::kv("Skills", &stats.skills.to_string());
        ui::kv("Experiences", &stats.experiences.to_string());
        ui::kv("Total", &stats.total.to_string());
        let limit = config.memory.max_memories;
        if stats.total > config.memory.cleanup_threshold() {
            ui::kv_warn("Limit", &format!("{limit} (over the eviction threshold)"));
        } else {
            ui::kv("Limit", &limit.to_string());
        }
    });
}

/// First line of the content, cut to a fixed width.
fn preview(entry: &MemoryEntry) -> String {
    let first_line = entry.content.lines().next().unwrap_or_default();
    if first_line.chars().count() > PREVIEW_CHARS {
        let cut: String = first_line.chars().take(PREVIEW_CHARS - 3).collect();
        format!("{cut}...")
    } else {
        first_line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    #[test]
    fn test_preview_truncates_first_line() {
        let long = "x".repeat(100);
        let entry = MemoryEntry::new("a", MemoryKind::Fact, long, Map::new(), 0.5);
        let shown = preview(&entry);
        assert_eq!(shown.chars().count(), PREVIEW_CHARS);
        assert!(shown.ends_with("..."));

        let entry = MemoryEntry::new(
            "a",
            MemoryKind::Experience,
            "Experience: shipped\nOutcome: ok",
            Map::new(),
            0.6,
        );
        assert_eq!(preview(&entry), "Experience: shipped");
    }
}
