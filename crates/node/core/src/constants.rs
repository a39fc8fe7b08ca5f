//! Default values for node configuration.

use std::net::Ipv4Addr;

/// Default control channel group.
pub const DEFAULT_CONTROL_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 1);

/// Default chunk-push channel group.
pub const DEFAULT_PUSH_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 2);

/// Default chunk-pull channel group.
pub const DEFAULT_PULL_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 0, 3);

/// Default control channel port.
pub const DEFAULT_CONTROL_PORT: u16 = 8001;

/// Default chunk-push channel port.
pub const DEFAULT_PUSH_PORT: u16 = 8002;

/// Default chunk-pull channel port.
pub const DEFAULT_PULL_PORT: u16 = 8003;

/// Default multicast TTL; keeps traffic on the local network.
pub const DEFAULT_MULTICAST_TTL: u32 = 1;

/// Name of the config file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Default replication degree for `backup`.
pub const DEFAULT_REPLICATION_DEGREE: u8 = 1;
