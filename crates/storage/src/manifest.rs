//! Files this peer has backed up.
//!
//! Restoring a file needs its chunk count, which the network never stores,
//! so the backing-up peer keeps it here together with the original path.

use std::path::PathBuf;

use cairn_primitives::{FileId, ReplicationDegree};
use serde::{Deserialize, Serialize};

use crate::{
    StorageResult,
    durable::{DurableMap, Keyed},
};

/// One backed-up file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file_id: FileId,
    /// Path the file was read from.
    pub path: PathBuf,
    /// Chunk count, including the trailing empty chunk when present.
    pub total_chunks: u64,
    pub desired: ReplicationDegree,
}

impl Keyed for ManifestEntry {
    type Key = FileId;

    fn key(&self) -> FileId {
        self.file_id.clone()
    }
}

/// Durable record of backed-up files, keyed by file id.
pub struct Manifest {
    files: DurableMap<ManifestEntry>,
}

impl Manifest {
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        Ok(Self {
            files: DurableMap::open(path)?,
        })
    }

    pub fn ephemeral() -> Self {
        Self {
            files: DurableMap::ephemeral(),
        }
    }

    /// Insert or replace the entry of a file.
    pub fn record(&self, entry: ManifestEntry) -> StorageResult<()> {
        self.files.mutate(|f| {
            f.insert(entry.file_id.clone(), entry);
        })
    }

    pub fn get(&self, file_id: &FileId) -> Option<ManifestEntry> {
        self.files.read(|f| f.get(file_id).cloned())
    }

    /// Entry recorded for `path`, if any.
    pub fn find_by_path(&self, path: &std::path::Path) -> Option<ManifestEntry> {
        self.files
            .read(|f| f.values().find(|entry| entry.path == path).cloned())
    }

    pub fn remove(&self, file_id: &FileId) -> StorageResult<Option<ManifestEntry>> {
        if self.get(file_id).is_none() {
            return Ok(None);
        }
        self.files.mutate(|f| f.remove(file_id))
    }

    pub fn entries(&self) -> Vec<ManifestEntry> {
        self.files.read(|f| f.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(byte: u8, path: &str) -> ManifestEntry {
        ManifestEntry {
            file_id: FileId::from_digest([byte; 32]),
            path: PathBuf::from(path),
            total_chunks: 3,
            desired: 2,
        }
    }

    #[test]
    fn test_record_replaces() {
        let manifest = Manifest::ephemeral();
        manifest.record(entry(1, "/a")).unwrap();
        let mut updated = entry(1, "/a");
        updated.total_chunks = 7;
        manifest.record(updated.clone()).unwrap();

        assert_eq!(manifest.get(&updated.file_id), Some(updated));
        assert_eq!(manifest.entries().len(), 1);
    }

    #[test]
    fn test_find_and_remove() {
        let manifest = Manifest::ephemeral();
        manifest.record(entry(1, "/a")).unwrap();
        manifest.record(entry(2, "/b")).unwrap();

        let b = manifest.find_by_path(std::path::Path::new("/b")).unwrap();
        assert_eq!(b.file_id, FileId::from_digest([2; 32]));
        assert!(manifest.remove(&b.file_id).unwrap().is_some());
        assert!(manifest.remove(&b.file_id).unwrap().is_none());
        assert!(manifest.find_by_path(std::path::Path::new("/b")).is_none());
    }

    #[test]
    fn test_reload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        {
            let manifest = Manifest::open(&path).unwrap();
            manifest.record(entry(1, "/a")).unwrap();
            manifest.record(entry(2, "/b")).unwrap();
            manifest.remove(&FileId::from_digest([1; 32])).unwrap();
        }
        let reloaded = Manifest::open(&path).unwrap();
        assert_eq!(reloaded.entries(), vec![entry(2, "/b")]);
    }
}
