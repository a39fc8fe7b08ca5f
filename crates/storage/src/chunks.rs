//! Chunk body storage.
//!
//! The [`ChunkStore`] trait abstracts over where chunk bodies live, with a
//! directory-backed implementation for peers and an in-memory one for tests.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
};

use auto_impl::auto_impl;
use bytes::Bytes;
use cairn_primitives::{ChunkKey, FileId};
use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::{CHUNK_EXTENSION, StorageResult};

/// Chunk body storage backend.
///
/// Implementations must be thread-safe. All methods may block on disk I/O,
/// so async callers should run them on a blocking thread.
#[auto_impl(&, Box, Arc)]
pub trait ChunkStore: Send + Sync {
    /// Store a chunk body.
    ///
    /// If the chunk already exists, this is a no-op and returns `false`.
    fn put(&self, key: &ChunkKey, body: &[u8]) -> StorageResult<bool>;

    /// Get a chunk body, `None` if it is not held.
    fn get(&self, key: &ChunkKey) -> StorageResult<Option<Bytes>>;

    /// Check if a chunk body is held.
    fn contains(&self, key: &ChunkKey) -> StorageResult<bool>;

    /// Remove a chunk body.
    ///
    /// Returns whether the chunk was held.
    fn delete(&self, key: &ChunkKey) -> StorageResult<bool>;

    /// Keys of every chunk body held, in key order.
    fn list(&self) -> StorageResult<Vec<ChunkKey>>;

    /// Remove every chunk body of a file, returning the removed keys.
    fn delete_file(&self, file_id: &FileId) -> StorageResult<Vec<ChunkKey>> {
        let mut removed = Vec::new();
        for key in self.list()? {
            if &key.file_id == file_id && self.delete(&key)? {
                removed.push(key);
            }
        }
        Ok(removed)
    }
}

/// Chunk bodies stored as `<fileId>-<chunkNo>.chk` files in one directory.
#[derive(Debug)]
pub struct FsChunkStore {
    dir: PathBuf,
}

impl FsChunkStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "Opened chunk store");
        Ok(Self { dir })
    }

    /// Directory holding the chunk files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn chunk_path(&self, key: &ChunkKey) -> PathBuf {
        self.dir.join(format!("{key}.{CHUNK_EXTENSION}"))
    }
}

impl ChunkStore for FsChunkStore {
    fn put(&self, key: &ChunkKey, body: &[u8]) -> StorageResult<bool> {
        let path = self.chunk_path(key);
        if path.exists() {
            trace!(%key, "Chunk already stored");
            return Ok(false);
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, body)?;
        fs::rename(&tmp_path, &path)?;
        Ok(true)
    }

    fn get(&self, key: &ChunkKey) -> StorageResult<Option<Bytes>> {
        match fs::read(self.chunk_path(key)) {
            Ok(body) => Ok(Some(Bytes::from(body))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, key: &ChunkKey) -> StorageResult<bool> {
        Ok(self.chunk_path(key).try_exists()?)
    }

    fn delete(&self, key: &ChunkKey) -> StorageResult<bool> {
        match fs::remove_file(self.chunk_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StorageResult<Vec<ChunkKey>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CHUNK_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match stem.parse::<ChunkKey>() {
                Ok(key) => keys.push(key),
                Err(_) => trace!(path = %path.display(), "Skipping foreign file in chunk dir"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-memory chunk store.
#[derive(Debug, Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<BTreeMap<ChunkKey, Bytes>>,
    fail_reads: RwLock<bool>,
}

impl MemoryChunkStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail, to exercise storage error paths.
    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.write() = fail;
    }

    fn check_reads(&self) -> StorageResult<()> {
        if *self.fail_reads.read() {
            return Err(io::Error::other("injected read failure").into());
        }
        Ok(())
    }
}

impl ChunkStore for MemoryChunkStore {
    fn put(&self, key: &ChunkKey, body: &[u8]) -> StorageResult<bool> {
        let mut chunks = self.chunks.write();
        if chunks.contains_key(key) {
            return Ok(false);
        }
        chunks.insert(key.clone(), Bytes::copy_from_slice(body));
        Ok(true)
    }

    fn get(&self, key: &ChunkKey) -> StorageResult<Option<Bytes>> {
        self.check_reads()?;
        Ok(self.chunks.read().get(key).cloned())
    }

    fn contains(&self, key: &ChunkKey) -> StorageResult<bool> {
        Ok(self.chunks.read().contains_key(key))
    }

    fn delete(&self, key: &ChunkKey) -> StorageResult<bool> {
        Ok(self.chunks.write().remove(key).is_some())
    }

    fn list(&self) -> StorageResult<Vec<ChunkKey>> {
        Ok(self.chunks.read().keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn key(file: u8, n: u32) -> ChunkKey {
        ChunkKey::new(FileId::from_digest([file; 32]), n)
    }

    #[test]
    fn test_put_get() {
        let dir = tempdir().unwrap();
        let store = FsChunkStore::open(dir.path().join("chunks")).unwrap();

        assert!(store.put(&key(1, 0), b"hello world").unwrap());
        assert_eq!(
            store.get(&key(1, 0)).unwrap(),
            Some(Bytes::from_static(b"hello world"))
        );
        assert_eq!(store.get(&key(1, 1)).unwrap(), None);
        assert!(dir.path().join("chunks").join(format!("{}.chk", key(1, 0))).exists());
    }

    #[test]
    fn test_idempotent_put() {
        let dir = tempdir().unwrap();
        let store = FsChunkStore::open(dir.path()).unwrap();

        assert!(store.put(&key(1, 0), b"first").unwrap());
        assert!(!store.put(&key(1, 0), b"second").unwrap());

        // Should still have first data (no overwrite)
        assert_eq!(
            store.get(&key(1, 0)).unwrap(),
            Some(Bytes::from_static(b"first"))
        );
    }

    #[test]
    fn test_empty_body() {
        let dir = tempdir().unwrap();
        let store = FsChunkStore::open(dir.path()).unwrap();

        store.put(&key(2, 3), b"").unwrap();
        assert!(store.contains(&key(2, 3)).unwrap());
        assert_eq!(store.get(&key(2, 3)).unwrap(), Some(Bytes::new()));
    }

    #[test]
    fn test_list_skips_foreign_files() {
        let dir = tempdir().unwrap();
        let store = FsChunkStore::open(dir.path()).unwrap();
        fs::write(dir.path().join("ledger.json"), b"[]").unwrap();
        fs::write(dir.path().join("junk.chk"), b"").unwrap();

        store.put(&key(1, 2), b"b").unwrap();
        store.put(&key(1, 0), b"a").unwrap();

        assert_eq!(store.list().unwrap(), vec![key(1, 0), key(1, 2)]);
    }

    #[test]
    fn test_delete_file() {
        let dir = tempdir().unwrap();
        let store = FsChunkStore::open(dir.path()).unwrap();
        for n in 0..3 {
            store.put(&key(1, n), b"x").unwrap();
        }
        store.put(&key(2, 0), b"y").unwrap();

        let removed = store.delete_file(&FileId::from_digest([1; 32])).unwrap();
        assert_eq!(removed.len(), 3);
        assert_eq!(store.list().unwrap(), vec![key(2, 0)]);
        assert!(!store.delete(&key(1, 0)).unwrap());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryChunkStore::new();
        store.put(&key(1, 0), b"a").unwrap();
        assert!(store.contains(&key(1, 0)).unwrap());

        store.fail_reads(true);
        assert!(store.get(&key(1, 0)).is_err());
        store.fail_reads(false);

        assert!(store.delete(&key(1, 0)).unwrap());
        assert!(store.list().unwrap().is_empty());
    }
}
