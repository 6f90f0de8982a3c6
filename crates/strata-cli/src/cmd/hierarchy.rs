//! Agent hierarchy view.

use crate::cmd::{block_on, open_substrate, print_json};
use crate::ui;
use colored::Colorize;
use std::collections::HashSet;
use std::path::PathBuf;
use strata_kernel::config::load_config;
use strata_types::agent::HierarchyView;

pub fn cmd_hierarchy_show(config: Option<PathBuf>, json: bool) {
    let config = load_config(config.as_deref());
    block_on(async {
        let substrate = open_substrate(&config).await;
        let view = substrate.hierarchy().get_hierarchy().await;
        if json {
            print_json(&view);
            return;
        }
        if view.relationships.is_empty() {
            ui::check_warn("No active agents registered");
            return;
        }

        ui::section("Agent hierarchy");
        for line in render_tree(&view) {
            println!("  {line}");
        }
        ui::blank();
        let stats = substrate.hierarchy().get_stats().await;
        ui::kv("Agents", &stats.total_agents.to_string());
        ui::kv("Max depth", &stats.max_depth.to_string());
    });
}

/// One line per agent, depth-first from each root, children indented under
/// their superior. Agents unreachable from a root are listed last.
fn render_tree(view: &HierarchyView) -> Vec<String> {
    let mut lines = Vec::new();
    let mut seen = HashSet::new();
    let mut stack: Vec<(&str, usize)> = view
        .root_agents
        .iter()
        .rev()
        .map(|id| (id.as_str(), 0))
        .collect();

    let mut orphans = view
        .relationships
        .keys()
        .map(String::as_str)
        .filter(|id| !view.root_agents.iter().any(|r| r == id));

    loop {
        let Some((id, depth)) = stack.pop() else {
            // Anything left unseen hangs off an unregistered superior.
            match orphans.by_ref().find(|id| !seen.contains(id)) {
                Some(id) => {
                    stack.push((id, 0));
                    continue;
                }
                None => break,
            }
        };
        if !seen.insert(id) {
            continue;
        }
        let Some(rel) = view.relationships.get(id) else {
            continue;
        };
        lines.push(format!(
            "{}{} {} {}",
            "  ".repeat(depth),
            if depth == 0 { "\u{25cf}" } else { "\u{2514}\u{2500}" },
            id.bold(),
            format!("({}, {})", rel.name, rel.role).dimmed()
        ));
        for sub in rel.subordinates.iter().rev() {
            stack.push((sub.as_str(), depth + 1));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_types::agent::Relationship;

    fn rel(superior: Option<&str>, subs: &[&str]) -> Relationship {
        Relationship {
            superior: superior.map(String::from),
            subordinates: subs.iter().map(|s| s.to_string()).collect(),
            level: 0,
            name: "n".to_string(),
            role: "r".to_string(),
            status: "active".to_string(),
        }
    }

    #[test]
    fn test_tree_order_and_orphans() {
        colored::control::set_override(false);
        let mut view = HierarchyView {
            root_agents: vec!["boss".to_string()],
            ..Default::default()
        };
        view.relationships.insert("boss".into(), rel(None, &["a", "b"]));
        view.relationships.insert("a".into(), rel(Some("boss"), &["a1"]));
        view.relationships.insert("a1".into(), rel(Some("a"), &[]));
        view.relationships.insert("b".into(), rel(Some("boss"), &[]));
        view.relationships.insert("stray".into(), rel(Some("gone"), &[]));

        let lines = render_tree(&view);
        let ids: Vec<&str> = lines
            .iter()
            .map(|l| l.split_whitespace().nth(1).unwrap())
            .collect();
        assert_eq!(ids, vec!["boss", "a", "a1", "b", "stray"]);
        assert!(lines[2].starts_with("    "));
    }
}
