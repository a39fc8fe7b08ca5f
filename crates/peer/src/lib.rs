//! A cairn peer.
//!
//! Wires the codec, transport, storage and replication crates together:
//!
//! - [`Dispatcher`] - reacts to every inbound protocol message
//! - [`Peer`] - the operations a user drives: backup, restore, delete, reclaim
//! - [`PeerService`] - reads the three inbound channels and feeds the dispatcher
//!
//! Files are split by a [`Chunker`] and reassembled in order by a
//! [`RestoreAssembler`].

mod chunker;
mod config;
mod dispatch;
mod error;
mod metrics;
mod peer;
mod restore;

pub use chunker::Chunker;
pub use config::{DEFAULT_REPLY_JITTER, PeerConfig};
pub use dispatch::Dispatcher;
pub use error::PeerError;
pub use peer::{BackupReport, DELETE_REPEAT, Peer, PeerService, RestoreReport};
pub use restore::RestoreAssembler;
