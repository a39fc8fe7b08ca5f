//! Directory management for a cairn node.

use std::{fs, path::PathBuf};

use directories::ProjectDirs;
use eyre::{Result, eyre};

use crate::{args::DataDirArgs, config::StorageConfig, constants::CONFIG_FILE_NAME};

/// Returns the default project directories for cairn.
pub fn default_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "cairn", "cairn")
}

/// Returns the default data directory path.
pub fn default_data_dir() -> Option<PathBuf> {
    default_project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Resolved locations of a node's local state.
#[derive(Debug, Clone)]
pub struct DataDirs {
    /// Root data directory
    pub root: PathBuf,
}

impl DataDirs {
    /// Resolve the data directory from the command line, creating it if needed.
    pub fn new(args: &DataDirArgs) -> Result<Self> {
        let root = args
            .datadir
            .clone()
            .unwrap_or_else(|| default_data_dir().unwrap_or_else(|| PathBuf::from(".cairn")));

        fs::create_dir_all(&root)
            .map_err(|e| eyre!("Failed to create directory {}: {}", root.display(), e))?;

        Ok(Self { root })
    }

    /// Returns the path to the config file.
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    /// Directory holding `<fileId>-<chunkNo>.chk` bodies.
    pub fn chunks_dir(&self, storage: &StorageConfig) -> PathBuf {
        self.root.join(&storage.chunks_dir)
    }

    /// The chunk ledger, next to the chunk bodies.
    pub fn ledger_file(&self, storage: &StorageConfig) -> PathBuf {
        self.chunks_dir(storage).join("ledger.json")
    }

    pub fn manifest_file(&self, storage: &StorageConfig) -> PathBuf {
        self.root.join(&storage.manifest_file)
    }
}
