//! Wire codec for cairn protocol messages.
//!
//! Every datagram is an ASCII header followed by an optional raw body:
//!
//! ```text
//! <Kind> <Field> <Field> ... CRLF CRLF <Body>
//! ```
//!
//! The header/body boundary is found by scanning at most [`MAX_HEADER_LEN`]
//! bytes for the terminator, so binary bodies are never split as text.

mod error;
mod message;
mod wire;

pub use error::CodecError;
pub use message::{Chunk, Delete, GetChunk, Message, MessageKind, PutChunk, Removed, Stored};

/// Header terminator: two CRLF sequences.
pub const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Longest header the decoder will scan for the terminator.
pub const MAX_HEADER_LEN: usize = 1024;

/// Largest datagram a peer can produce: a full chunk plus its header.
pub const MAX_DATAGRAM_LEN: usize =
    cairn_primitives::CHUNK_SIZE + MAX_HEADER_LEN + HEADER_TERMINATOR.len();
