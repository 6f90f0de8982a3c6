//! Strata CLI: operator commands for the Strata persistence layer.
//!
//! Every command loads the configuration, opens the data directory in-process
//! and exits. `strata start` keeps the kernel running with automatic backups.

mod cli;
mod cmd;
pub mod table;
mod ui;

use crate::cli::*;
use clap::Parser;
use strata_kernel::config::load_config;

/// Log to stderr. `RUST_LOG` wins over the configured level.
fn init_tracing_stderr(default_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();

    // Peek at the configured level before tracing is installed; the command
    // loads the config again once logging is live.
    let log_level = load_config(cli.config.as_deref()).log_level;
    init_tracing_stderr(&log_level);

    match cli.command {
        Commands::Init { data_dir, force } => cmd::init::cmd_init(cli.config, data_dir, force),
        Commands::Start => cmd::init::cmd_start(cli.config),
        Commands::Validate { repair, json } => cmd::system::cmd_validate(cli.config, repair, json),
        Commands::Stats { json } => cmd::system::cmd_stats(cli.config, json),
        Commands::Backup(sub) => match sub {
            BackupCommands::Create { name } => cmd::backup::cmd_backup_create(cli.config, name),
            BackupCommands::List { json } => cmd::backup::cmd_backup_list(cli.config, json),
            BackupCommands::Restore { name } => cmd::backup::cmd_backup_restore(cli.config, &name),
            BackupCommands::Verify { name, json } => {
                cmd::backup::cmd_backup_verify(cli.config, &name, json)
            }
            BackupCommands::Delete { name } => cmd::backup::cmd_backup_delete(cli.config, &name),
            BackupCommands::Cleanup { keep, max_age_days } => {
                cmd::backup::cmd_backup_cleanup(cli.config, keep, max_age_days)
            }
        },
        Commands::Memory(sub) => match sub {
            MemoryCommands::Search {
                query,
                agent,
                kind,
                limit,
                json,
            } => cmd::memory::cmd_memory_search(
                cli.config,
                &agent,
                &query,
                kind.as_deref(),
                limit,
                json,
            ),
            MemoryCommands::Stats { agent, json } => {
                cmd::memory::cmd_memory_stats(cli.config, &agent, json)
            }
        },
        Commands::Hierarchy(sub) => match sub {
            HierarchyCommands::Show { json } => cmd::hierarchy::cmd_hierarchy_show(cli.config, json),
        },
    }
}
