//! CLI argument parsing with clap

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

// Re-export command types for convenience
pub use crate::commands::backup::BackupArgs;
pub use crate::commands::list::ListArgs;
pub use crate::commands::prune::PruneArgs;
pub use crate::commands::restore::RestoreArgs;
pub use crate::commands::schedule::SchedulerArgs;

/// Vaultkeep - consistent backups and restores for containerized application data
#[derive(Parser, Debug)]
#[command(name = "vaultkeep")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the YAML configuration file
    #[arg(
        short,
        long,
        global = true,
        env = "VAULTKEEP_CONFIG",
        default_value = "vaultkeep.yaml"
    )]
    pub config: Utf8PathBuf,

    /// Also append logs to this file (parent directories are created)
    #[arg(long, global = true)]
    pub log_file: Option<Utf8PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Take one backup now
    Backup(BackupArgs),

    /// Restore a backup over the data directory
    Restore(RestoreArgs),

    /// Take backups on a fixed interval until interrupted
    RunScheduler(SchedulerArgs),

    /// List backups in the destination
    List(ListArgs),

    /// Apply the retention policy without taking a backup
    Prune(PruneArgs),
}
