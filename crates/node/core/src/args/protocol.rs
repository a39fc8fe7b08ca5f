//! Protocol CLI arguments.

use cairn_primitives::PeerId;
use clap::Args;

/// Overrides for protocol behaviour. Unset values keep the config file's.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq)]
#[command(next_help_heading = "Protocol")]
pub struct ProtocolArgs {
    /// Sender id written into this peer's messages.
    #[arg(long, global = true, env = "CAIRN_PEER_ID")]
    pub peer_id: Option<PeerId>,

    /// First confirmation window in milliseconds; doubled on every retry.
    #[arg(long = "protocol.window-ms", global = true, value_name = "MS")]
    pub initial_window_ms: Option<u64>,

    /// Retries after the first send before giving up.
    #[arg(long = "protocol.max-attempts", global = true)]
    pub max_attempts: Option<u32>,

    /// Upper bound of the random reply delay in milliseconds.
    #[arg(long = "protocol.jitter-ms", global = true, value_name = "MS")]
    pub reply_jitter_ms: Option<u64>,
}
