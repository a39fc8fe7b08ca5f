//! Ordered map persisted as a JSON array.

use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use serde::{Serialize, de::DeserializeOwned};

use crate::StorageResult;

/// A record that knows its own key.
pub(crate) trait Keyed {
    type Key: Ord + Clone;

    fn key(&self) -> Self::Key;
}

/// In-memory image of a JSON document, rewritten on every mutation.
///
/// Mutations are applied to a copy of the image under the write lock and only
/// swapped in after the rewrite succeeded, so a failed write leaves both the
/// file and the image in their last consistent state.
pub(crate) struct DurableMap<V: Keyed> {
    path: Option<PathBuf>,
    records: RwLock<BTreeMap<V::Key, V>>,
}

impl<V> DurableMap<V>
where
    V: Keyed + Clone + Serialize + DeserializeOwned,
{
    /// Load an existing document or start empty.
    pub(crate) fn open(path: impl Into<PathBuf>) -> StorageResult<Self> {
        let path = path.into();
        let records = if path.exists() {
            load(&path)?
        } else {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    /// A map that is never written to disk.
    pub(crate) fn ephemeral() -> Self {
        Self {
            path: None,
            records: RwLock::new(BTreeMap::new()),
        }
    }

    pub(crate) fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&BTreeMap<V::Key, V>) -> R) -> R {
        f(&self.records.read())
    }

    /// Apply `f` and rewrite the document.
    pub(crate) fn mutate<R>(
        &self,
        f: impl FnOnce(&mut BTreeMap<V::Key, V>) -> R,
    ) -> StorageResult<R> {
        let mut records = self.records.write();
        let mut next = records.clone();
        let result = f(&mut next);
        if let Some(path) = &self.path {
            save(path, &next)?;
        }
        *records = next;
        Ok(result)
    }
}

fn load<V>(path: &Path) -> StorageResult<BTreeMap<V::Key, V>>
where
    V: Keyed + DeserializeOwned,
{
    let reader = BufReader::new(File::open(path)?);
    let list: Vec<V> = serde_json::from_reader(reader)?;
    Ok(list.into_iter().map(|v| (v.key(), v)).collect())
}

fn save<V>(path: &Path, records: &BTreeMap<V::Key, V>) -> StorageResult<()>
where
    V: Keyed + Serialize,
{
    let list: Vec<&V> = records.values().collect();

    // Write to temp file first, then rename (atomic)
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        serde_json::to_writer_pretty(&mut writer, &list)?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}
