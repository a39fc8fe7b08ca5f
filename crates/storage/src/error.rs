//! Storage error types.

use cairn_primitives::ChunkKey;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Chunk body not found.
    #[error("chunk not found: {0}")]
    NotFound(ChunkKey),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
