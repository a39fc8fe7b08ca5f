//! Data directory CLI arguments.

use clap::Args;
use std::path::PathBuf;

/// Data directory configuration.
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Datadir")]
pub struct DataDirArgs {
    /// Data directory for config, chunks, ledger and manifest.
    #[arg(long, global = true, value_name = "PATH", env = "CAIRN_DATADIR")]
    pub datadir: Option<PathBuf>,
}
