//! Codec error types.

use crate::MessageKind;

/// Reasons a datagram is rejected as malformed.
///
/// These never travel further than the listener: the datagram is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// No `CRLF CRLF` within the header region.
    #[error("header terminator not found in first {0} bytes")]
    MissingTerminator(usize),

    /// Header bytes are not UTF-8.
    #[error("header is not valid utf-8")]
    NonUtf8Header,

    /// First header field names no known message kind.
    #[error("unknown message kind: {0:?}")]
    UnknownKind(String),

    /// Field count does not match the declared kind.
    #[error("{kind} expects {expected} header fields, got {actual}")]
    FieldCount {
        kind: MessageKind,
        expected: usize,
        actual: usize,
    },

    /// A header field failed to parse.
    #[error("invalid {field}: {value:?}")]
    InvalidField { field: &'static str, value: String },

    /// Body attached to a kind that carries none.
    #[error("{0} must not carry a body")]
    UnexpectedBody(MessageKind),

    /// Body exceeds the chunk size.
    #[error("body of {0} bytes exceeds chunk size")]
    BodyTooLarge(usize),
}

impl CodecError {
    pub(crate) fn invalid(field: &'static str, value: &str) -> Self {
        Self::InvalidField {
            field,
            value: value.to_string(),
        }
    }
}
