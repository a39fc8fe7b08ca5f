//! Command line argument groups shared by every subcommand.

mod datadir;
mod log;
mod network;
mod protocol;

pub use datadir::DataDirArgs;
pub use log::LogArgs;
pub use network::NetworkArgs;
pub use protocol::ProtocolArgs;
