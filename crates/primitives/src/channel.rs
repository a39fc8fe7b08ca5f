//! Logical channels.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// One of the three logical multicast groups.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ChannelId {
    /// Control announcements: `STORED`, `GETCHUNK`, `DELETE`, `REMOVED`.
    Control,
    /// Chunk backup requests: `PUTCHUNK`.
    Push,
    /// Chunk restore replies: `CHUNK`.
    Pull,
}
