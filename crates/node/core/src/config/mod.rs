//! Node configuration handling.
//!
//! Configuration is split into submodules:
//! - `network` - multicast groups
//! - `protocol` - peer id and replication timing
//! - `storage` - on-disk layout

mod network;
mod protocol;
mod storage;

pub use network::NetworkConfig;
pub use protocol::ProtocolConfig;
pub use storage::StorageConfig;

use std::{fs, path::Path};

use cairn_peer::PeerConfig;
use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::args::{NetworkArgs, ProtocolArgs};

/// Configuration for a cairn node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Protocol configuration
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl NodeConfig {
    /// Load the configuration from the given path, or create a default one if it doesn't exist.
    pub fn load_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            debug!(path = %path.display(), "Loaded config");
            Ok(config)
        } else {
            let config = Self::default();
            config.save(path)?;
            info!(path = %path.display(), "Created default config");
            Ok(config)
        }
    }

    /// Save the configuration to the given path.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Apply command line arguments to override the configuration.
    ///
    /// Returns whether anything changed.
    pub fn apply_cli_args(&mut self, network_args: &NetworkArgs, protocol_args: &ProtocolArgs) -> bool {
        let before = self.clone();

        if let Some(control) = network_args.control {
            self.network.control = control;
        }
        if let Some(push) = network_args.push {
            self.network.push = push;
        }
        if let Some(pull) = network_args.pull {
            self.network.pull = pull;
        }
        if let Some(interface) = network_args.interface {
            self.network.interface = interface;
        }
        if let Some(ttl) = network_args.ttl {
            self.network.ttl = ttl;
        }

        if let Some(peer_id) = &protocol_args.peer_id {
            self.protocol.peer_id = Some(peer_id.clone());
        }
        if let Some(window) = protocol_args.initial_window_ms {
            self.protocol.initial_window_ms = window;
        }
        if let Some(max_attempts) = protocol_args.max_attempts {
            self.protocol.max_attempts = max_attempts;
        }
        if let Some(jitter) = protocol_args.reply_jitter_ms {
            self.protocol.reply_jitter_ms = jitter;
        }

        *self != before
    }

    /// Runtime peer configuration. Fails if no peer id is configured.
    pub fn peer_config(&self) -> Result<PeerConfig> {
        let local = self
            .protocol
            .peer_id
            .clone()
            .ok_or_else(|| eyre!("no peer id configured; pass --peer-id or set protocol.peer_id"))?;
        Ok(self.protocol.peer_config(local))
    }
}
