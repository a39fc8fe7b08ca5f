//! Storage layout configuration for TOML persistence.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where local state lives, relative to the data directory unless absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory of stored chunk bodies and the chunk ledger
    #[serde(default = "default_chunks_dir")]
    pub chunks_dir: PathBuf,

    /// Manifest of files backed up from this peer
    #[serde(default = "default_manifest_file")]
    pub manifest_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            chunks_dir: default_chunks_dir(),
            manifest_file: default_manifest_file(),
        }
    }
}

fn default_chunks_dir() -> PathBuf {
    PathBuf::from("chunks")
}

fn default_manifest_file() -> PathBuf {
    PathBuf::from("manifest.json")
}
