//! Core primitive types for cairn peers.
//!
//! Every crate in the workspace speaks in terms of these types:
//!
//! - [`FileId`] - stable identity of a backed-up file (64 hex characters)
//! - [`PeerId`] - the sender token carried in message headers
//! - [`ChunkKey`] - a `(FileId, ChunkNo)` pair, the unit of replication
//! - [`ChannelId`] - the three logical multicast groups peers talk over

mod channel;
mod chunk;
mod file;
mod peer;

pub use channel::ChannelId;
pub use chunk::{ChunkKey, ChunkNo, chunk_count};
pub use file::FileId;
pub use peer::PeerId;

/// Maximum size of a chunk body in bytes.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Protocol version written into every versioned header.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Replication degree requested for (or observed of) a chunk.
pub type ReplicationDegree = u8;

/// Errors raised when parsing primitive identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PrimitivesError {
    /// File id is not 64 hexadecimal characters.
    #[error("invalid file id: {0:?}")]
    InvalidFileId(String),

    /// Peer id is empty or contains whitespace.
    #[error("invalid peer id: {0:?}")]
    InvalidPeerId(String),

    /// Chunk key is not of the form `<fileId>-<chunkNo>`.
    #[error("invalid chunk key: {0:?}")]
    InvalidChunkKey(String),
}
