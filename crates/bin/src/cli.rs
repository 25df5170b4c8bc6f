//! CLI argument definitions for the Ordinal binary.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use rust_decimal::Decimal;

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// SQLite database (default)
    Sqlite,
    /// PostgreSQL database (for shared deployments)
    Postgres,
    /// In-memory with JSON persistence (for development)
    Inmemory,
}

/// Ordinal: ordered records in named groups
#[derive(Parser, Debug)]
#[command(name = "ordinal")]
#[command(about = "Ordinal: conflict-tolerant ordering of records within groups")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub backend_config: BackendConfig,

    #[command(flatten)]
    pub tuning: TuningArgs,

    /// Print JSON instead of tables
    #[arg(long, global = true, env = "ORDINAL_JSON")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where records are stored.
#[derive(clap::Args, Debug, Clone)]
pub struct BackendConfig {
    /// Storage backend to use
    #[arg(short, long, default_value = "sqlite", env = "ORDINAL_BACKEND", global = true)]
    pub backend: Backend,

    /// Data directory for storage files.
    /// For SQLite: stores ordinal.db
    /// For InMemory: stores ordinal.json
    #[arg(short = 'D', long, env = "ORDINAL_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// PostgreSQL connection URL (required when backend=postgres)
    #[arg(long, env = "ORDINAL_POSTGRES_URL", global = true)]
    pub postgres_url: Option<String>,
}

/// Position and retry settings. Flags override the config file.
#[derive(clap::Args, Debug, Clone)]
pub struct TuningArgs {
    /// JSON configuration file
    #[arg(short, long, env = "ORDINAL_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Spacing of appended records and of rebalanced groups
    #[arg(long, env = "ORDINAL_DEFAULT_GAP", global = true)]
    pub default_gap: Option<Decimal>,

    /// Gaps below this value trigger a rebalance
    #[arg(long, env = "ORDINAL_MIN_GAP", global = true)]
    pub min_gap: Option<Decimal>,

    /// Retries after a position conflict
    #[arg(long, env = "ORDINAL_MAX_RETRIES", global = true)]
    pub max_retries: Option<u32>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Append a record to a group
    Add(AddArgs),
    /// Move a record between two neighbours
    Move(MoveArgs),
    /// List a group in display order
    List(GroupArgs),
    /// List every group
    Groups,
    /// Show gap statistics for a group
    Stats(GroupArgs),
    /// Re-space crowded groups
    Rebalance(RebalanceArgs),
    /// Print a diagnostic report
    Report(ReportArgs),
    /// Delete a record
    Delete(IdArgs),
}

/// Arguments for the add command
#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Group to append to
    pub group: String,

    /// JSON payload stored with the record
    #[arg(short, long, default_value = "{}")]
    pub payload: String,
}

/// Arguments for the move command
#[derive(clap::Args, Debug)]
pub struct MoveArgs {
    /// Record to move
    pub id: String,

    /// Target group
    pub group: String,

    /// Record that should precede the moved one
    #[arg(long)]
    pub after: Option<String>,

    /// Record that should follow the moved one
    #[arg(long)]
    pub before: Option<String>,
}

/// A single group
#[derive(clap::Args, Debug)]
pub struct GroupArgs {
    /// Group key
    pub group: String,
}

/// A single record
#[derive(clap::Args, Debug)]
pub struct IdArgs {
    /// Record id
    pub id: String,
}

/// Arguments for the rebalance command
#[derive(clap::Args, Debug)]
#[command(group(ArgGroup::new("target").required(true).args(["group", "all"])))]
pub struct RebalanceArgs {
    /// Rebalance this group unconditionally
    pub group: Option<String>,

    /// Rebalance every group that needs it
    #[arg(long)]
    pub all: bool,
}

/// Arguments for the report command
#[derive(clap::Args, Debug)]
pub struct ReportArgs {
    /// Only report this group
    #[arg(short, long)]
    pub group: Option<String>,
}
