//! Chunk metadata ledger.
//!
//! One [`LedgerEntry`] per chunk body this peer holds on behalf of another
//! peer. The actual replication degree is a best-effort count built from
//! `STORED` and `REMOVED` announcements; it is never authoritative.

use std::{collections::BTreeSet, path::PathBuf};

use cairn_primitives::{ChunkKey, FileId, PeerId, ReplicationDegree};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    StorageResult,
    durable::{DurableMap, Keyed},
};

/// Replication bookkeeping for one locally held chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Peer that originally submitted the chunk for backup.
    pub owner: PeerId,
    #[serde(flatten)]
    pub key: ChunkKey,
    /// Replication degree the owner asked for.
    pub desired: ReplicationDegree,
    /// Number of peers believed to hold the chunk.
    pub actual: ReplicationDegree,
    /// Peers observed confirming storage, this peer included.
    #[serde(default)]
    pub holders: BTreeSet<PeerId>,
    /// Peers whose removal was already counted.
    #[serde(default)]
    pub removed: BTreeSet<PeerId>,
}

impl LedgerEntry {
    /// Entry for a chunk this peer just stored.
    ///
    /// The local peer counts as the first holder.
    pub fn new(owner: PeerId, key: ChunkKey, desired: ReplicationDegree, local: PeerId) -> Self {
        Self {
            owner,
            key,
            desired,
            actual: 1,
            holders: BTreeSet::from([local]),
            removed: BTreeSet::new(),
        }
    }

    /// Whether fewer peers hold the chunk than its owner asked for.
    pub fn is_under_replicated(&self) -> bool {
        self.actual < self.desired
    }
}

impl Keyed for LedgerEntry {
    type Key = ChunkKey;

    fn key(&self) -> ChunkKey {
        self.key.clone()
    }
}

/// Durable ledger of locally held chunks.
///
/// Every mutation rewrites the whole file while holding the ledger's write
/// lock, so concurrent read-modify-write cycles are serialized.
pub struct Ledger {
    entries: DurableMap<LedgerEntry>,
}

impl Ledger {
    /// Load the ledger at `path`, or start an empty one.
    pub fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let entries = DurableMap::open(path)?;
        if let Some(path) = entries.path() {
            debug!(path = %path.display(), entries = entries.read(|e| e.len()), "Opened ledger");
        }
        Ok(Self { entries })
    }

    /// A ledger that lives only in memory.
    pub fn ephemeral() -> Self {
        Self {
            entries: DurableMap::ephemeral(),
        }
    }

    /// Record a newly stored chunk.
    ///
    /// Returns `false` and leaves the existing entry untouched if the chunk is
    /// already recorded.
    pub fn record_stored(&self, entry: LedgerEntry) -> StorageResult<bool> {
        if self.entries.read(|e| e.contains_key(&entry.key)) {
            return Ok(false);
        }
        self.entries
            .mutate(|e| e.insert(entry.key.clone(), entry).is_none())
    }

    /// Entry for one chunk.
    pub fn get(&self, key: &ChunkKey) -> Option<LedgerEntry> {
        self.entries.read(|e| e.get(key).cloned())
    }

    /// All entries belonging to a file, in chunk order.
    pub fn find_by_file(&self, file_id: &FileId) -> Vec<LedgerEntry> {
        self.entries.read(|e| {
            e.values()
                .filter(|entry| &entry.key.file_id == file_id)
                .cloned()
                .collect()
        })
    }

    /// Count `peer` as holding the chunk.
    ///
    /// Returns `true` if the peer was not counted before. Unknown chunks and
    /// repeated confirmations leave the ledger untouched. A peer that
    /// announced a removal and stores the chunk again counts anew.
    pub fn record_holder(&self, key: &ChunkKey, peer: &PeerId) -> StorageResult<bool> {
        let known = self
            .entries
            .read(|e| e.get(key).map(|entry| entry.holders.contains(peer)));
        if known != Some(false) {
            return Ok(false);
        }
        self.entries.mutate(|e| match e.get_mut(key) {
            Some(entry) => {
                if !entry.holders.insert(peer.clone()) {
                    return false;
                }
                entry.removed.remove(peer);
                entry.actual = entry.actual.saturating_add(1);
                true
            }
            None => false,
        })
    }

    /// Account for `peer` no longer holding the chunk.
    ///
    /// Every removal lowers the actual degree once, whether or not this peer
    /// saw the matching `STORED`; only a repeated announcement from a peer
    /// already counted as removed is ignored. Returns the updated entry only
    /// when it is left [under-replicated](LedgerEntry::is_under_replicated),
    /// which is the caller's cue to re-publish the chunk.
    pub fn decrement_actual(
        &self,
        key: &ChunkKey,
        peer: &PeerId,
    ) -> StorageResult<Option<LedgerEntry>> {
        let counted = self
            .entries
            .read(|e| e.get(key).map(|entry| entry.removed.contains(peer)));
        if counted != Some(false) {
            return Ok(None);
        }
        self.entries
            .mutate(|e| {
                let entry = e.get_mut(key)?;
                if !entry.removed.insert(peer.clone()) {
                    return None;
                }
                entry.holders.remove(peer);
                entry.actual = entry.actual.saturating_sub(1);
                Some(entry.clone())
            })
            .map(|updated| updated.filter(LedgerEntry::is_under_replicated))
    }

    /// Drop the entry of one chunk.
    pub fn remove(&self, key: &ChunkKey) -> StorageResult<Option<LedgerEntry>> {
        if !self.entries.read(|e| e.contains_key(key)) {
            return Ok(None);
        }
        self.entries.mutate(|e| e.remove(key))
    }

    /// Drop every entry of a file, returning what was removed.
    pub fn remove_by_file(&self, file_id: &FileId) -> StorageResult<Vec<LedgerEntry>> {
        if self.find_by_file(file_id).is_empty() {
            return Ok(Vec::new());
        }
        self.entries.mutate(|e| {
            let keys: Vec<ChunkKey> = e
                .keys()
                .filter(|key| &key.file_id == file_id)
                .cloned()
                .collect();
            keys.iter().filter_map(|key| e.remove(key)).collect()
        })
    }

    /// Keys of every chunk recorded in the ledger.
    pub fn list_local_chunk_files(&self) -> Vec<ChunkKey> {
        self.entries.read(|e| e.keys().cloned().collect())
    }

    /// Snapshot of all entries, in key order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.read(|e| e.values().cloned().collect())
    }

    pub fn len(&self) -> usize {
        self.entries.read(|e| e.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn peer(id: &str) -> PeerId {
        PeerId::new(id).unwrap()
    }

    fn key(file: u8, n: u32) -> ChunkKey {
        ChunkKey::new(FileId::from_digest([file; 32]), n)
    }

    fn entry(file: u8, n: u32, desired: ReplicationDegree) -> LedgerEntry {
        LedgerEntry::new(peer("owner"), key(file, n), desired, peer("me"))
    }

    #[test]
    fn test_record_and_find() {
        let ledger = Ledger::ephemeral();
        assert!(ledger.record_stored(entry(1, 0, 2)).unwrap());
        assert!(ledger.record_stored(entry(1, 1, 2)).unwrap());
        assert!(ledger.record_stored(entry(2, 0, 1)).unwrap());
        assert!(!ledger.record_stored(entry(1, 0, 3)).unwrap());

        let found = ledger.find_by_file(&FileId::from_digest([1; 32]));
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].desired, 2);
        assert_eq!(found[0].actual, 1);
    }

    #[test]
    fn test_holder_accounting_is_idempotent() {
        let ledger = Ledger::ephemeral();
        ledger.record_stored(entry(1, 0, 3)).unwrap();

        assert!(ledger.record_holder(&key(1, 0), &peer("a")).unwrap());
        assert!(!ledger.record_holder(&key(1, 0), &peer("a")).unwrap());
        assert!(!ledger.record_holder(&key(1, 0), &peer("me")).unwrap());
        assert!(!ledger.record_holder(&key(9, 0), &peer("a")).unwrap());
        assert_eq!(ledger.get(&key(1, 0)).unwrap().actual, 2);
    }

    #[test]
    fn test_decrement_below_desired() {
        let ledger = Ledger::ephemeral();
        ledger.record_stored(entry(1, 0, 2)).unwrap();
        ledger.record_holder(&key(1, 0), &peer("a")).unwrap();

        let updated = ledger
            .decrement_actual(&key(1, 0), &peer("a"))
            .unwrap()
            .unwrap();
        assert_eq!(updated.actual, 1);
        assert!(updated.is_under_replicated());
        assert!(!updated.holders.contains(&peer("a")));

        // Still at or above desired: nothing to re-publish.
        ledger.record_holder(&key(1, 0), &peer("b")).unwrap();
        ledger.record_holder(&key(1, 0), &peer("c")).unwrap();
        assert!(ledger.decrement_actual(&key(1, 0), &peer("c")).unwrap().is_none());
        assert_eq!(ledger.get(&key(1, 0)).unwrap().actual, 2);
        ledger.decrement_actual(&key(1, 0), &peer("b")).unwrap();

        // Repeated announcement from the same peer changes nothing.
        assert!(ledger.decrement_actual(&key(1, 0), &peer("a")).unwrap().is_none());
        assert_eq!(ledger.get(&key(1, 0)).unwrap().actual, 1);
        // Unknown chunks are ignored.
        assert!(ledger.decrement_actual(&key(9, 0), &peer("a")).unwrap().is_none());
    }

    #[test]
    fn test_removal_from_unseen_holder_counts() {
        let ledger = Ledger::ephemeral();
        ledger.record_stored(entry(1, 0, 2)).unwrap();

        // "x" never announced STORED here, its removal still counts once.
        let updated = ledger
            .decrement_actual(&key(1, 0), &peer("x"))
            .unwrap()
            .unwrap();
        assert_eq!(updated.actual, 0);
        assert!(ledger.decrement_actual(&key(1, 0), &peer("x")).unwrap().is_none());
        assert_eq!(ledger.get(&key(1, 0)).unwrap().actual, 0);
    }

    #[test]
    fn test_holder_returning_after_removal() {
        let ledger = Ledger::ephemeral();
        ledger.record_stored(entry(1, 0, 2)).unwrap();
        ledger.record_holder(&key(1, 0), &peer("a")).unwrap();
        ledger.decrement_actual(&key(1, 0), &peer("a")).unwrap();

        assert!(ledger.record_holder(&key(1, 0), &peer("a")).unwrap());
        let entry = ledger.get(&key(1, 0)).unwrap();
        assert_eq!(entry.actual, 2);
        assert!(entry.removed.is_empty());

        // A second removal after re-storing counts again.
        assert!(ledger.decrement_actual(&key(1, 0), &peer("a")).unwrap().is_some());
        assert_eq!(ledger.get(&key(1, 0)).unwrap().actual, 1);
    }

    #[test]
    fn test_remove_by_file() {
        let ledger = Ledger::ephemeral();
        ledger.record_stored(entry(1, 0, 1)).unwrap();
        ledger.record_stored(entry(1, 1, 1)).unwrap();
        ledger.record_stored(entry(2, 0, 1)).unwrap();

        let removed = ledger.remove_by_file(&FileId::from_digest([1; 32])).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(ledger.list_local_chunk_files(), vec![key(2, 0)]);
        assert!(ledger.remove_by_file(&FileId::from_digest([1; 32])).unwrap().is_empty());
    }

    #[test]
    fn test_reload_matches_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("chunks").join("ledger.json");

        let expected = {
            let ledger = Ledger::open(&path).unwrap();
            for n in 0..4 {
                ledger.record_stored(entry(1, n, 2)).unwrap();
            }
            ledger.record_stored(entry(2, 0, 3)).unwrap();
            ledger.record_holder(&key(1, 0), &peer("a")).unwrap();
            ledger.record_holder(&key(1, 0), &peer("b")).unwrap();
            ledger.decrement_actual(&key(1, 0), &peer("a")).unwrap();
            ledger.remove(&key(1, 3)).unwrap();
            ledger.remove_by_file(&FileId::from_digest([2; 32])).unwrap();
            ledger.entries()
        };

        let reloaded = Ledger::open(&path).unwrap();
        assert_eq!(reloaded.entries(), expected);
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.get(&key(1, 0)).unwrap().actual, 2);
    }

    #[test]
    fn test_failed_rewrite_keeps_last_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let ledger = Ledger::open(&path).unwrap();
        ledger.record_stored(entry(1, 0, 1)).unwrap();

        // A directory where the temp file should go makes the rewrite fail.
        std::fs::create_dir(dir.path().join("ledger.json.tmp")).unwrap();
        assert!(ledger.record_stored(entry(1, 1, 1)).is_err());
        assert_eq!(ledger.len(), 1);
        assert_eq!(Ledger::open(&path).unwrap().len(), 1);
    }
}
