//! Typed protocol messages.

use bytes::Bytes;
use cairn_primitives::{
    ChannelId, ChunkKey, FileId, PROTOCOL_VERSION, PeerId, ReplicationDegree,
};
use strum::{Display, EnumString};

/// Discriminant of a [`Message`], spelled as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MessageKind {
    PutChunk,
    Stored,
    GetChunk,
    Chunk,
    Delete,
    Removed,
}

impl MessageKind {
    /// Channel this kind of message travels on.
    pub fn channel(&self) -> ChannelId {
        match self {
            Self::PutChunk => ChannelId::Push,
            Self::Chunk => ChannelId::Pull,
            Self::Stored | Self::GetChunk | Self::Delete | Self::Removed => ChannelId::Control,
        }
    }

    /// Whether this kind carries a body after the header.
    pub fn has_body(&self) -> bool {
        matches!(self, Self::PutChunk | Self::Chunk)
    }
}

/// Request to store a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutChunk {
    pub version: String,
    /// Peer the confirmations should be accounted to. A peer re-publishing
    /// on behalf of the original owner writes the owner's id here.
    pub sender: PeerId,
    pub key: ChunkKey,
    pub desired: ReplicationDegree,
    pub body: Bytes,
}

/// Confirmation that `sender` holds the chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    pub version: String,
    pub sender: PeerId,
    pub key: ChunkKey,
}

/// Request for a chunk body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetChunk {
    pub version: String,
    pub sender: PeerId,
    pub key: ChunkKey,
}

/// Chunk body sent in reply to a [`GetChunk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub key: ChunkKey,
    pub body: Bytes,
}

/// Request that every peer drops all chunks of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delete {
    pub file_id: FileId,
}

/// Announcement that `sender` no longer holds the chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub sender: PeerId,
    pub key: ChunkKey,
}

/// A decoded protocol message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    PutChunk(PutChunk),
    Stored(Stored),
    GetChunk(GetChunk),
    Chunk(Chunk),
    Delete(Delete),
    Removed(Removed),
}

impl Message {
    /// A `PUTCHUNK` at the current protocol version.
    pub fn put_chunk(
        sender: PeerId,
        key: ChunkKey,
        desired: ReplicationDegree,
        body: Bytes,
    ) -> Self {
        Self::PutChunk(PutChunk {
            version: PROTOCOL_VERSION.to_string(),
            sender,
            key,
            desired,
            body,
        })
    }

    /// A `STORED` at the current protocol version.
    pub fn stored(sender: PeerId, key: ChunkKey) -> Self {
        Self::Stored(Stored {
            version: PROTOCOL_VERSION.to_string(),
            sender,
            key,
        })
    }

    /// A `GETCHUNK` at the current protocol version.
    pub fn get_chunk(sender: PeerId, key: ChunkKey) -> Self {
        Self::GetChunk(GetChunk {
            version: PROTOCOL_VERSION.to_string(),
            sender,
            key,
        })
    }

    pub fn chunk(key: ChunkKey, body: Bytes) -> Self {
        Self::Chunk(Chunk { key, body })
    }

    pub fn delete(file_id: FileId) -> Self {
        Self::Delete(Delete { file_id })
    }

    pub fn removed(sender: PeerId, key: ChunkKey) -> Self {
        Self::Removed(Removed { sender, key })
    }

    /// Kind of this message.
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::PutChunk(_) => MessageKind::PutChunk,
            Self::Stored(_) => MessageKind::Stored,
            Self::GetChunk(_) => MessageKind::GetChunk,
            Self::Chunk(_) => MessageKind::Chunk,
            Self::Delete(_) => MessageKind::Delete,
            Self::Removed(_) => MessageKind::Removed,
        }
    }

    /// Channel this message travels on.
    pub fn channel(&self) -> ChannelId {
        self.kind().channel()
    }

    /// Chunk this message is about, if it names one.
    pub fn key(&self) -> Option<&ChunkKey> {
        match self {
            Self::PutChunk(m) => Some(&m.key),
            Self::Stored(m) => Some(&m.key),
            Self::GetChunk(m) => Some(&m.key),
            Self::Chunk(m) => Some(&m.key),
            Self::Removed(m) => Some(&m.key),
            Self::Delete(_) => None,
        }
    }

    /// File this message is about.
    pub fn file_id(&self) -> &FileId {
        match self {
            Self::Delete(m) => &m.file_id,
            Self::PutChunk(PutChunk { key, .. })
            | Self::Stored(Stored { key, .. })
            | Self::GetChunk(GetChunk { key, .. })
            | Self::Chunk(Chunk { key, .. })
            | Self::Removed(Removed { key, .. }) => &key.file_id,
        }
    }

    /// Peer named in the `senderId` field, if the kind carries one.
    pub fn sender(&self) -> Option<&PeerId> {
        match self {
            Self::PutChunk(m) => Some(&m.sender),
            Self::Stored(m) => Some(&m.sender),
            Self::GetChunk(m) => Some(&m.sender),
            Self::Removed(m) => Some(&m.sender),
            Self::Chunk(_) | Self::Delete(_) => None,
        }
    }
}
