//! Logging CLI arguments.

use clap::Args;

/// Logging configuration.
#[derive(Debug, Args, Clone, Default)]
#[command(next_help_heading = "Logging")]
pub struct LogArgs {
    /// Silence all output but errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (-v, -vv).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Log filter directive (e.g., "cairn_replication=trace").
    #[arg(long = "log.filter", global = true, value_name = "DIRECTIVE")]
    pub filter: Option<String>,
}
