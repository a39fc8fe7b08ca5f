//! Logging configuration for a cairn node.

use eyre::{Result, eyre};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::args::LogArgs;

/// Initialize logging based on command line arguments.
///
/// The filter is built with the following precedence:
/// 1. If `--quiet` is set, only errors are shown
/// 2. Otherwise, start with `RUST_LOG` env var if set, or a level chosen by verbosity
/// 3. Apply any custom filter from `--log.filter`
///
/// Directives in `--log.filter` that fail to parse are skipped and reported
/// once the subscriber is installed.
pub fn init_logging(args: &LogArgs) -> Result<()> {
    let (filter, rejected) = build_filter(args);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(args.verbosity > 0)
        .try_init()
        .map_err(|e| eyre!("failed to install log subscriber: {e}"))?;

    for directive in rejected {
        warn!(%directive, "Ignoring invalid log filter directive");
    }
    debug!(verbosity = args.verbosity, quiet = args.quiet, "Logging initialized");
    Ok(())
}

fn build_filter(args: &LogArgs) -> (EnvFilter, Vec<String>) {
    if args.quiet {
        return (EnvFilter::new("error"), Vec::new());
    }

    let base_level = match args.verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(base_level));
    let mut rejected = Vec::new();

    if let Some(custom_filter) = &args.filter {
        for directive in custom_filter.split(',').filter(|d| !d.trim().is_empty()) {
            match directive.parse() {
                Ok(d) => filter = filter.add_directive(d),
                Err(_) => rejected.push(directive.to_string()),
            }
        }
    }

    (filter, rejected)
}
