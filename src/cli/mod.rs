//! CLI definitions and entry point.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CliOverrides;

pub mod commands;

/// Incremental, branch-aware archive for chat export files (`SQLite`)
#[derive(Parser, Debug)]
#[command(name = "tk", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: $XDG_DATA_HOME/threadkeep/archive.db)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// `SQLite` busy timeout in ms
    #[arg(long, global = true)]
    pub lock_timeout: Option<u64>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Import an export file
    Import(ImportArgs),

    /// List past import attempts, newest first
    History(HistoryArgs),

    /// Show the branch tree of a conversation
    Branches(BranchesArgs),
}

/// Arguments for the import command.
#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Export file (JSON array of conversations)
    pub file: PathBuf,

    /// Process the file even if it was already imported successfully
    #[arg(long)]
    pub force: bool,

    /// Stream files larger than this many bytes instead of loading them whole
    #[arg(long)]
    pub streaming_threshold: Option<u64>,
}

/// Arguments for the history command.
#[derive(Args, Debug, Clone, Default)]
pub struct HistoryArgs {
    /// Maximum number of entries to show
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,
}

/// Arguments for the branches command.
#[derive(Args, Debug, Clone)]
pub struct BranchesArgs {
    /// Conversation UUID
    pub conversation: String,
}

impl Cli {
    /// Config overrides carried by the global flags and, for `import`, its own flags.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        let mut overrides = CliOverrides {
            db: self.db.clone(),
            lock_timeout: self.lock_timeout,
            ..CliOverrides::default()
        };
        if let Commands::Import(args) = &self.command {
            overrides.streaming_threshold = args.streaming_threshold;
            overrides.force = args.force.then_some(true);
        }
        overrides
    }
}
