//! Local persistence for a cairn peer.
//!
//! - [`ChunkStore`] - chunk bodies this peer holds (the local chunk index)
//! - [`Ledger`] - replication bookkeeping for every chunk held
//! - [`Manifest`] - files this peer backed up, with their chunk counts
//!
//! The ledger and manifest are small JSON documents rewritten in full on
//! every mutation (temp file, then rename), so a crash never leaves a
//! half-written file behind.

mod chunks;
mod durable;
mod error;
mod ledger;
mod manifest;

pub use chunks::{ChunkStore, FsChunkStore, MemoryChunkStore};
pub use error::{StorageError, StorageResult};
pub use ledger::{Ledger, LedgerEntry};
pub use manifest::{Manifest, ManifestEntry};

/// File extension of stored chunk bodies.
pub const CHUNK_EXTENSION: &str = "chk";
