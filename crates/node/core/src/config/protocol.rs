//! Protocol configuration for TOML persistence.

use std::time::Duration;

use cairn_peer::{DEFAULT_REPLY_JITTER, PeerConfig};
use cairn_primitives::PeerId;
use cairn_replication::{DEFAULT_INITIAL_WINDOW, DEFAULT_MAX_ATTEMPTS, ReplicationConfig};
use serde::{Deserialize, Serialize};

/// Protocol timing and identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Sender id of this peer. Must be set before the peer can run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<PeerId>,

    /// First confirmation window in milliseconds
    #[serde(default = "default_initial_window_ms")]
    pub initial_window_ms: u64,

    /// Retries after the first send
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound of the random reply delay in milliseconds
    #[serde(default = "default_reply_jitter_ms")]
    pub reply_jitter_ms: u64,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            peer_id: None,
            initial_window_ms: default_initial_window_ms(),
            max_attempts: default_max_attempts(),
            reply_jitter_ms: default_reply_jitter_ms(),
        }
    }
}

impl ProtocolConfig {
    pub fn replication(&self) -> ReplicationConfig {
        ReplicationConfig::default()
            .with_initial_window(Duration::from_millis(self.initial_window_ms))
            .with_max_attempts(self.max_attempts)
    }

    /// Runtime peer configuration for the given sender id.
    pub fn peer_config(&self, local: PeerId) -> PeerConfig {
        PeerConfig::new(local)
            .with_replication(self.replication())
            .with_reply_jitter(Duration::from_millis(self.reply_jitter_ms))
    }
}

fn default_initial_window_ms() -> u64 {
    DEFAULT_INITIAL_WINDOW.as_millis() as u64
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_reply_jitter_ms() -> u64 {
    DEFAULT_REPLY_JITTER.as_millis() as u64
}
