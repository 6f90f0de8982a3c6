//! Clap CLI definitions for Strata.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub const AFTER_HELP: &str = "\
\x1b[1mHint:\x1b[0m Commands suffixed with [*] have subcommands. Run `<command> --help` for details.

\x1b[1;36mExamples:\x1b[0m
  strata init                       Create config and data directory
  strata validate --repair          Check every document and fix what can be fixed
  strata backup create nightly      Take a manual snapshot named `nightly`
  strata backup restore nightly     Roll the data directory back to `nightly`
  strata memory search rust -a a1   Search agent a1's memories
  strata hierarchy show             Print the agent tree";

/// Strata: a JSON multi-document persistence layer for agent systems.
#[derive(Parser)]
#[command(name = "strata", version, about, after_help = AFTER_HELP)]
pub struct Cli {
    /// Path to config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize Strata (create ~/.strata/, default config and documents).
    Init {
        /// Data directory to record in the new config.
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Boot the kernel and run the backup loop until Ctrl+C.
    Start,
    /// Validate every document.
    Validate {
        /// Write repaired documents back.
        #[arg(long)]
        repair: bool,
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Show storage, memory, hierarchy and backup statistics.
    Stats {
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Manage snapshots (create, list, restore, verify, delete, cleanup) [*].
    #[command(subcommand)]
    Backup(BackupCommands),
    /// Inspect agent memories (search, stats) [*].
    #[command(subcommand)]
    Memory(MemoryCommands),
    /// Inspect the agent hierarchy (show) [*].
    #[command(subcommand)]
    Hierarchy(HierarchyCommands),
}

#[derive(Subcommand)]
pub enum BackupCommands {
    /// Take a snapshot. Without a name, an automatic snapshot is taken.
    Create {
        /// Snapshot name.
        name: Option<String>,
    },
    /// List snapshots, newest first.
    List {
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Restore a snapshot (a safety snapshot is taken first).
    Restore {
        /// Snapshot name.
        name: String,
    },
    /// Check a snapshot's files and metadata.
    Verify {
        /// Snapshot name.
        name: String,
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Delete a snapshot.
    Delete {
        /// Snapshot name.
        name: String,
    },
    /// Apply retention to automatic snapshots.
    Cleanup {
        /// Snapshots to keep (default: backup.keep_count).
        #[arg(long)]
        keep: Option<usize>,
        /// Maximum age in days (default: backup.max_age_days).
        #[arg(long)]
        max_age_days: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Case-insensitive search over one agent's memories.
    Search {
        /// Text to look for.
        query: String,
        /// Agent the search is logged under; every agent's memories are searched.
        #[arg(long, short = 'a', default_value = "cli")]
        agent: String,
        /// Restrict to one kind (interaction, fact, skill, experience).
        #[arg(long, short = 'k')]
        kind: Option<String>,
        /// Maximum results.
        #[arg(long, short = 'n', default_value_t = 10)]
        limit: usize,
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
    /// Per-kind memory counts for one agent.
    Stats {
        /// Agent to count.
        #[arg(long, short = 'a')]
        agent: String,
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum HierarchyCommands {
    /// Print the superior/subordinate tree.
    Show {
        /// Output as JSON for scripting.
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_memory_search() {
        let cli = Cli::try_parse_from([
            "strata", "memory", "search", "rust", "--agent", "a1", "-n", "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Memory(MemoryCommands::Search {
                query, agent, limit, kind, ..
            }) => {
                assert_eq!(query, "rust");
                assert_eq!(agent, "a1");
                assert_eq!(limit, 3);
                assert!(kind.is_none());
            }
            _ => panic!("wrong command"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["strata", "validate", "--repair", "--config", "/tmp/s.toml"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/s.toml")));
        assert!(matches!(cli.command, Commands::Validate { repair: true, json: false }));
    }
}
