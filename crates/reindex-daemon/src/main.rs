//! Content Reindex Daemon
//!
//! Keeps search indexes in sync with a content repository's event queue.
//!
//! # Usage
//!
//! ```bash
//! reindex-daemon start
//! reindex-daemon run --index web_index
//! reindex-daemon replay events.json
//! reindex-daemon admin stats
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/content-reindex/config.toml)
//! 3. Environment variables (REINDEX_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use reindex_daemon::{handle_admin, handle_replay, run_index, start_daemon, Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let db_path = cli.db_path.as_deref();
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Start => {
            start_daemon(config, db_path, log_level).await?;
        }
        Commands::Run { index } => {
            run_index(config, db_path, log_level, &index).await?;
        }
        Commands::Replay { file } => {
            handle_replay(&file)?;
        }
        Commands::Admin { command } => {
            handle_admin(config, db_path, command)?;
        }
    }

    Ok(())
}
