//! CLI argument parsing for the reindex daemon.
//!
//! CLI flags override all other config sources.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Content Reindex Daemon
///
/// Keeps search indexes in sync with a content repository's event queue.
#[derive(Parser, Debug)]
#[command(name = "reindex-daemon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default ~/.config/content-reindex/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Override database path
    #[arg(long, global = true)]
    pub db_path: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run interval reconciliation for every configured index until Ctrl-C
    Start,

    /// Run one reconciliation pass for an index and exit
    Run {
        /// Configured index name
        #[arg(short, long)]
        index: String,
    },

    /// Merge a JSON array of events and print the resulting change records
    Replay {
        /// File holding the events
        file: PathBuf,
    },

    /// Administrative commands
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
}

/// Admin subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum AdminCommands {
    /// Show database statistics
    Stats,

    /// Show an index's checkpoint and counters
    Checkpoint {
        /// Configured index name
        #[arg(short, long)]
        index: String,
    },

    /// List queued events
    Events {
        /// Only events after this timestamp
        #[arg(long)]
        since: Option<i64>,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },

    /// Append a JSON array of event payloads to the queue
    Append {
        /// File holding the payloads
        file: PathBuf,
    },

    /// Store a JSON array of content items
    PutItems {
        /// File holding the items
        file: PathBuf,
    },
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_start() {
        let cli = Cli::parse_from(["reindex-daemon", "start"]);
        assert!(matches!(cli.command, Commands::Start));
    }

    #[test]
    fn test_cli_with_config() {
        let cli = Cli::parse_from(["reindex-daemon", "--config", "/path/to/config.toml", "start"]);
        assert_eq!(cli.config, Some("/path/to/config.toml".to_string()));
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "reindex-daemon",
            "run",
            "--index",
            "web_index",
            "--db-path",
            "/custom/db",
            "-l",
            "debug",
        ]);
        assert_eq!(cli.db_path, Some("/custom/db".to_string()));
        assert_eq!(cli.log_level, Some("debug".to_string()));
        match cli.command {
            Commands::Run { index } => assert_eq!(index, "web_index"),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_run_requires_index() {
        assert!(Cli::try_parse_from(["reindex-daemon", "run"]).is_err());
    }

    #[test]
    fn test_cli_replay() {
        let cli = Cli::parse_from(["reindex-daemon", "replay", "events.json"]);
        match cli.command {
            Commands::Replay { file } => assert_eq!(file, PathBuf::from("events.json")),
            _ => panic!("Expected Replay command"),
        }
    }

    #[test]
    fn test_cli_admin_events_defaults() {
        let cli = Cli::parse_from(["reindex-daemon", "admin", "events"]);
        match cli.command {
            Commands::Admin {
                command: AdminCommands::Events { since, limit },
            } => {
                assert_eq!(since, None);
                assert_eq!(limit, 50);
            }
            _ => panic!("Expected Admin Events command"),
        }
    }

    #[test]
    fn test_cli_admin_checkpoint() {
        let cli = Cli::parse_from(["reindex-daemon", "admin", "checkpoint", "-i", "web_index"]);
        match cli.command {
            Commands::Admin {
                command: AdminCommands::Checkpoint { index },
            } => assert_eq!(index, "web_index"),
            _ => panic!("Expected Admin Checkpoint command"),
        }
    }

    #[test]
    fn test_cli_admin_put_items() {
        let cli = Cli::parse_from(["reindex-daemon", "admin", "put-items", "items.json"]);
        assert!(matches!(
            cli.command,
            Commands::Admin {
                command: AdminCommands::PutItems { .. }
            }
        ));
    }
}
