//! Peer error types.

use cairn_net_transport::TransportError;
use cairn_primitives::{ChunkKey, FileId};
use cairn_replication::ReplicationError;
use cairn_storage::StorageError;

/// Errors from peer operations.
#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    /// Local storage failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Replication did not complete.
    #[error(transparent)]
    Replication(#[from] ReplicationError),

    /// Sending on the network failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The file was never backed up from this peer.
    #[error("unknown file: {0}")]
    UnknownFile(FileId),

    /// No peer returned a chunk needed for a restore.
    #[error("chunk unavailable: {0}")]
    ChunkUnavailable(ChunkKey),

    /// Replication degree must be at least 1.
    #[error("invalid replication degree: {0}")]
    InvalidDegree(u8),

    /// Filesystem error outside the stores.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
