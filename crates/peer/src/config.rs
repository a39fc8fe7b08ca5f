//! Peer behaviour configuration.

use std::time::Duration;

use cairn_primitives::PeerId;
use cairn_replication::ReplicationConfig;
use rand::Rng;

/// Upper bound of the random delay before answering a broadcast.
pub const DEFAULT_REPLY_JITTER: Duration = Duration::from_millis(400);

/// Runtime configuration of one peer.
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Sender id this peer writes into its messages.
    pub local: PeerId,
    pub replication: ReplicationConfig,
    /// Replies (`STORED`, `CHUNK`, re-published `PUTCHUNK`) wait a uniform
    /// random delay in `[1ms, reply_jitter]` so peers answering the same
    /// broadcast do not collide.
    pub reply_jitter: Duration,
}

impl PeerConfig {
    pub fn new(local: PeerId) -> Self {
        Self {
            local,
            replication: ReplicationConfig::default(),
            reply_jitter: DEFAULT_REPLY_JITTER,
        }
    }

    pub fn with_replication(mut self, replication: ReplicationConfig) -> Self {
        self.replication = replication;
        self
    }

    pub fn with_reply_jitter(mut self, jitter: Duration) -> Self {
        self.reply_jitter = jitter;
        self
    }

    /// Draw a reply delay.
    pub(crate) fn jitter(&self) -> Duration {
        let max = u64::try_from(self.reply_jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(1..=max))
    }
}
