//! Peer identifiers.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::PrimitivesError;

/// Identifier a peer writes into the `senderId` header field.
///
/// Any non-empty token without whitespace is accepted, since the header is
/// whitespace-delimited.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PeerId(String);

impl PeerId {
    /// Create a peer id, validating it can travel in a header.
    pub fn new(id: impl Into<String>) -> Result<Self, PrimitivesError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(PrimitivesError::InvalidPeerId(id));
        }
        Ok(Self(id))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PeerId {
    type Err = PrimitivesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for PeerId {
    type Error = PrimitivesError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PeerId> for String {
    fn from(value: PeerId) -> Self {
        value.0
    }
}
