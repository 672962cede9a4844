//! Reindex daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (start, run, replay, admin)

pub mod cli;
pub mod commands;

pub use cli::{AdminCommands, Cli, Commands};
pub use commands::{
    build_indexes, handle_admin, handle_replay, init_logging, load_settings, open_storage,
    run_admin, run_index, run_index_with, start_daemon, IndexRuntime,
};
