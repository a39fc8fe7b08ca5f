//! Multicast CLI arguments.

use clap::Args;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Overrides for the multicast groups. Unset values keep the config file's.
#[derive(Debug, Args, Clone, Default, PartialEq, Eq)]
#[command(next_help_heading = "Networking")]
pub struct NetworkArgs {
    /// Control channel group, e.g. 239.255.0.1:8001.
    #[arg(long = "net.control", global = true, value_name = "GROUP:PORT")]
    pub control: Option<SocketAddrV4>,

    /// Chunk-push channel group.
    #[arg(long = "net.push", global = true, value_name = "GROUP:PORT")]
    pub push: Option<SocketAddrV4>,

    /// Chunk-pull channel group.
    #[arg(long = "net.pull", global = true, value_name = "GROUP:PORT")]
    pub pull: Option<SocketAddrV4>,

    /// Local interface to join the groups on.
    #[arg(long = "net.interface", global = true, value_name = "ADDR")]
    pub interface: Option<Ipv4Addr>,

    /// Multicast TTL.
    #[arg(long = "net.ttl", global = true)]
    pub ttl: Option<u32>,
}
