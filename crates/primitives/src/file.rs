//! File identity.

use std::{
    fmt,
    io,
    path::Path,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::PrimitivesError;

/// Length of a file id in hex characters.
const FILE_ID_LEN: usize = 64;

/// Identity of a backed-up file: an upper-case hex SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileId(String);

impl FileId {
    /// Build a file id from a raw 32-byte digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Self(hex::encode_upper(digest))
    }

    /// Derive the file id from a path and its filesystem attributes.
    ///
    /// The identity is content-independent: it hashes the path as given, the
    /// size, and the creation and modification times. Backing up an
    /// unmodified file again yields the same id without reading its bytes.
    /// Identical content at two paths gets two ids, and two files sharing
    /// path, size and timestamps collide. Filesystems that do not report a
    /// creation time contribute a fixed marker instead.
    pub fn for_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let meta = std::fs::metadata(path)?;
        Ok(Self::from_attributes(
            &path.to_string_lossy(),
            meta.len(),
            meta.created().ok(),
            meta.modified().ok(),
        ))
    }

    /// Derive the file id from already-collected attributes.
    pub fn from_attributes(
        path: &str,
        size: u64,
        created: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update([0]);
        hasher.update(size.to_be_bytes());
        for time in [created, modified] {
            hasher.update([0]);
            match time.and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
                Some(since) => hasher.update(since.as_nanos().to_be_bytes()),
                None => hasher.update(b"none"),
            }
        }
        Self::from_digest(hasher.finalize().into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for FileId {
    type Err = PrimitivesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != FILE_ID_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(PrimitivesError::InvalidFileId(s.to_string()));
        }
        Ok(Self(s.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for FileId {
    type Error = PrimitivesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FileId> for String {
    fn from(value: FileId) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_file_id_parse() {
        let id = FileId::from_digest([0x0f; 32]);
        assert_eq!(id.as_str().len(), 64);
        assert_eq!(id.as_str().parse::<FileId>().unwrap(), id);
        assert_eq!(id.as_str().to_lowercase().parse::<FileId>().unwrap(), id);
        assert!("abc".parse::<FileId>().is_err());
        assert!("Z".repeat(64).parse::<FileId>().is_err());
    }

    #[test]
    fn test_attributes_are_stable() {
        let t = UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        let a = FileId::from_attributes("/tmp/a", 10, Some(t), Some(t));
        let b = FileId::from_attributes("/tmp/a", 10, Some(t), Some(t));
        assert_eq!(a, b);

        assert_ne!(a, FileId::from_attributes("/tmp/b", 10, Some(t), Some(t)));
        assert_ne!(a, FileId::from_attributes("/tmp/a", 11, Some(t), Some(t)));
        let later = t + Duration::from_secs(1);
        assert_ne!(a, FileId::from_attributes("/tmp/a", 10, Some(t), Some(later)));
    }

    #[test]
    fn test_for_path_unmodified_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"hello").unwrap();

        let first = FileId::for_path(&path).unwrap();
        let second = FileId::for_path(&path).unwrap();
        assert_eq!(first, second);

        assert!(FileId::for_path(dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_serde_validates() {
        let id = FileId::from_digest([1; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(serde_json::from_str::<FileId>(&json).unwrap(), id);
        assert!(serde_json::from_str::<FileId>("\"short\"").is_err());
    }
}
