//! Replication error types.

use cairn_primitives::ChunkKey;

use crate::ReplicationOutcome;

/// Errors from the replication service.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// Retry budget spent before enough peers confirmed.
    #[error("{} chunk(s) under-replicated", shortfalls.len())]
    ReplicationShortfall {
        /// Outcome of every chunk that missed its desired degree.
        shortfalls: Vec<ReplicationOutcome>,
    },

    /// A ticket for this chunk is already open.
    #[error("ticket already open for chunk {0}")]
    TicketExists(ChunkKey),

    /// The service task is gone.
    #[error("replication service stopped")]
    ServiceStopped,
}
