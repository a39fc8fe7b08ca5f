//! Datagram encoding and decoding.

use bytes::{BufMut, Bytes, BytesMut};
use cairn_primitives::{CHUNK_SIZE, ChunkKey, ChunkNo, FileId, PeerId, ReplicationDegree};

use crate::{
    CodecError, HEADER_TERMINATOR, MAX_HEADER_LEN,
    message::{Chunk, Delete, GetChunk, Message, MessageKind, PutChunk, Removed, Stored},
};

impl Message {
    /// Encode into a single datagram.
    pub fn encode(&self) -> Bytes {
        let kind = self.kind().to_string();
        let header: Vec<&str> = match self {
            Self::PutChunk(m) => vec![
                kind.as_str(),
                m.version.as_str(),
                m.sender.as_str(),
                m.key.file_id.as_str(),
            ],
            Self::Stored(Stored {
                version,
                sender,
                key,
            })
            | Self::GetChunk(GetChunk {
                version,
                sender,
                key,
            }) => vec![
                kind.as_str(),
                version.as_str(),
                sender.as_str(),
                key.file_id.as_str(),
            ],
            Self::Chunk(m) => vec![kind.as_str(), m.key.file_id.as_str()],
            Self::Delete(m) => vec![kind.as_str(), m.file_id.as_str()],
            Self::Removed(m) => vec![kind.as_str(), m.sender.as_str(), m.key.file_id.as_str()],
        };

        // numeric trailing fields
        let mut tail = Vec::new();
        if let Some(key) = self.key() {
            tail.push(key.chunk_no.to_string());
        }
        if let Self::PutChunk(m) = self {
            tail.push(m.desired.to_string());
        }

        let body: &[u8] = match self {
            Self::PutChunk(m) => &m.body,
            Self::Chunk(m) => &m.body,
            _ => &[],
        };

        let mut buf = BytesMut::with_capacity(MAX_HEADER_LEN / 4 + body.len());
        let fields = header.into_iter().chain(tail.iter().map(String::as_str));
        for (i, field) in fields.enumerate() {
            if i > 0 {
                buf.put_u8(b' ');
            }
            buf.put_slice(field.as_bytes());
        }
        buf.put_slice(HEADER_TERMINATOR);
        buf.put_slice(body);
        buf.freeze()
    }

    /// Decode a datagram.
    ///
    /// The body is everything after the first terminator and is taken as an
    /// opaque byte run.
    pub fn decode(datagram: &[u8]) -> Result<Self, CodecError> {
        let (scan, _) =
            datagram.split_at(datagram.len().min(MAX_HEADER_LEN + HEADER_TERMINATOR.len()));
        let boundary = scan
            .windows(HEADER_TERMINATOR.len())
            .position(|w| w == HEADER_TERMINATOR)
            .ok_or(CodecError::MissingTerminator(MAX_HEADER_LEN))?;

        let (header, rest) = datagram.split_at(boundary);
        let body = rest.get(HEADER_TERMINATOR.len()..).unwrap_or_default();

        let header = std::str::from_utf8(header).map_err(|_| CodecError::NonUtf8Header)?;
        let fields: Vec<&str> = header.split_ascii_whitespace().collect();

        let kind_field = fields.first().copied().unwrap_or_default();
        let kind: MessageKind = kind_field
            .parse()
            .map_err(|_| CodecError::UnknownKind(kind_field.to_string()))?;

        if !kind.has_body() && !body.is_empty() {
            return Err(CodecError::UnexpectedBody(kind));
        }
        if body.len() > CHUNK_SIZE {
            return Err(CodecError::BodyTooLarge(body.len()));
        }

        let message = match (kind, fields.as_slice()) {
            (MessageKind::PutChunk, [_, version, sender, file_id, chunk_no, desired]) => {
                Self::PutChunk(PutChunk {
                    version: parse_version(version)?,
                    sender: parse_peer(sender)?,
                    key: parse_key(file_id, chunk_no)?,
                    desired: parse_degree(desired)?,
                    body: Bytes::copy_from_slice(body),
                })
            }
            (MessageKind::Stored, [_, version, sender, file_id, chunk_no]) => {
                Self::Stored(Stored {
                    version: parse_version(version)?,
                    sender: parse_peer(sender)?,
                    key: parse_key(file_id, chunk_no)?,
                })
            }
            (MessageKind::GetChunk, [_, version, sender, file_id, chunk_no]) => {
                Self::GetChunk(GetChunk {
                    version: parse_version(version)?,
                    sender: parse_peer(sender)?,
                    key: parse_key(file_id, chunk_no)?,
                })
            }
            (MessageKind::Chunk, [_, file_id, chunk_no]) => Self::Chunk(Chunk {
                key: parse_key(file_id, chunk_no)?,
                body: Bytes::copy_from_slice(body),
            }),
            (MessageKind::Delete, [_, file_id]) => Self::Delete(Delete {
                file_id: parse_file_id(file_id)?,
            }),
            (MessageKind::Removed, [_, sender, file_id, chunk_no]) => Self::Removed(Removed {
                sender: parse_peer(sender)?,
                key: parse_key(file_id, chunk_no)?,
            }),
            (kind, fields) => {
                return Err(CodecError::FieldCount {
                    kind,
                    expected: field_count(kind),
                    actual: fields.len(),
                });
            }
        };

        Ok(message)
    }
}

/// Number of header fields, kind included, each kind carries.
fn field_count(kind: MessageKind) -> usize {
    match kind {
        MessageKind::PutChunk => 6,
        MessageKind::Stored | MessageKind::GetChunk => 5,
        MessageKind::Removed => 4,
        MessageKind::Chunk => 3,
        MessageKind::Delete => 2,
    }
}

fn parse_version(value: &str) -> Result<String, CodecError> {
    let valid = value
        .split_once('.')
        .is_some_and(|(major, minor)| is_digits(major) && is_digits(minor));
    if !valid {
        return Err(CodecError::invalid("version", value));
    }
    Ok(value.to_string())
}

fn parse_peer(value: &str) -> Result<PeerId, CodecError> {
    PeerId::new(value).map_err(|_| CodecError::invalid("sender id", value))
}

fn parse_file_id(value: &str) -> Result<FileId, CodecError> {
    value
        .parse()
        .map_err(|_| CodecError::invalid("file id", value))
}

fn parse_key(file_id: &str, chunk_no: &str) -> Result<ChunkKey, CodecError> {
    if !is_digits(chunk_no) {
        return Err(CodecError::invalid("chunk number", chunk_no));
    }
    let chunk_no: ChunkNo = chunk_no
        .parse()
        .map_err(|_| CodecError::invalid("chunk number", chunk_no))?;
    Ok(ChunkKey::new(parse_file_id(file_id)?, chunk_no))
}

fn parse_degree(value: &str) -> Result<ReplicationDegree, CodecError> {
    match value.parse::<ReplicationDegree>() {
        Ok(degree) if degree > 0 && is_digits(value) => Ok(degree),
        _ => Err(CodecError::invalid("replication degree", value)),
    }
}

fn is_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}
