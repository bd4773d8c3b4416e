//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dbpatch_core::MarkerMode;

/// Run sequential .sql patch files as transactions
///
/// Uses (or can create) a marker table holding the last applied revision,
/// so re-runs pick up where the previous run stopped.
#[derive(Parser, Debug)]
#[command(name = "db-patch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Defaults to `apply`
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Apply pending patches (asks before bootstrapping and before applying)
    Apply,

    /// Show the current revision and pending patches without changing anything
    Status {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show version
    Version,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// SQLite database file to patch
    #[arg(long = "db", env = "DB_PATH", global = true)]
    pub database: Option<PathBuf>,

    /// Directory to load patch files from
    #[arg(long, env = "PATCH_DIR", global = true)]
    pub patch_dir: Option<PathBuf>,

    /// Name of the marker table
    #[arg(long, env = "PATCH_TABLE", global = true)]
    pub table: Option<String>,

    /// Whether the marker update shares the patch transaction
    #[arg(long, global = true, value_name = "same-transaction|separate")]
    pub marker_mode: Option<MarkerMode>,

    /// Config file (default: ./db-patch.toml, then the user config dir)
    #[arg(long, env = "DB_PATCH_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Answer yes to every prompt
    #[arg(short, long, global = true)]
    pub yes: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
