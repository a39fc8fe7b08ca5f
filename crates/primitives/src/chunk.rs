//! Chunk keys and chunk arithmetic.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{CHUNK_SIZE, FileId, PrimitivesError};

/// Position of a chunk inside its file, starting at zero.
pub type ChunkNo = u32;

/// Identity of one chunk: the file it belongs to and its position.
///
/// Displays as `<fileId>-<chunkNo>`, which is also the on-disk name of a
/// stored chunk body.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChunkKey {
    /// File the chunk belongs to.
    pub file_id: FileId,
    /// Position of the chunk inside the file.
    pub chunk_no: ChunkNo,
}

impl ChunkKey {
    /// Create a new chunk key.
    pub fn new(file_id: FileId, chunk_no: ChunkNo) -> Self {
        Self { file_id, chunk_no }
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.file_id, self.chunk_no)
    }
}

impl FromStr for ChunkKey {
    type Err = PrimitivesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PrimitivesError::InvalidChunkKey(s.to_string());
        let (file_id, chunk_no) = s.rsplit_once('-').ok_or_else(invalid)?;
        let file_id = file_id.parse().map_err(|_| invalid())?;
        let chunk_no = chunk_no.parse().map_err(|_| invalid())?;
        Ok(Self::new(file_id, chunk_no))
    }
}

/// Number of chunks a file of `size` bytes is split into.
///
/// A file whose size is an exact multiple of [`CHUNK_SIZE`] (including an
/// empty file) gets an extra, empty trailing chunk so the receiver can tell
/// "ends on a boundary" apart from "last chunk is full".
pub fn chunk_count(size: u64) -> u64 {
    let chunk = CHUNK_SIZE as u64;
    size / chunk + 1
}
