//! Multicast configuration for TOML persistence.

use std::net::{Ipv4Addr, SocketAddrV4};

use cairn_net_transport::MulticastConfig;
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// The three multicast groups a peer talks over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Control channel group
    #[serde(default = "default_control")]
    pub control: SocketAddrV4,

    /// Chunk-push channel group
    #[serde(default = "default_push")]
    pub push: SocketAddrV4,

    /// Chunk-pull channel group
    #[serde(default = "default_pull")]
    pub pull: SocketAddrV4,

    /// Local interface to join the groups on
    #[serde(default = "default_interface")]
    pub interface: Ipv4Addr,

    /// Multicast TTL
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            control: default_control(),
            push: default_push(),
            pull: default_pull(),
            interface: default_interface(),
            ttl: default_ttl(),
        }
    }
}

impl NetworkConfig {
    /// Transport configuration for these groups.
    pub fn multicast(&self) -> MulticastConfig {
        MulticastConfig {
            control: self.control,
            push: self.push,
            pull: self.pull,
            interface: self.interface,
            ttl: self.ttl,
        }
    }
}

fn default_control() -> SocketAddrV4 {
    SocketAddrV4::new(DEFAULT_CONTROL_GROUP, DEFAULT_CONTROL_PORT)
}

fn default_push() -> SocketAddrV4 {
    SocketAddrV4::new(DEFAULT_PUSH_GROUP, DEFAULT_PUSH_PORT)
}

fn default_pull() -> SocketAddrV4 {
    SocketAddrV4::new(DEFAULT_PULL_GROUP, DEFAULT_PULL_PORT)
}

fn default_interface() -> Ipv4Addr {
    Ipv4Addr::UNSPECIFIED
}

fn default_ttl() -> u32 {
    DEFAULT_MULTICAST_TTL
}
