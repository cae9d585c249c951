// Copyright (c) 2024 Mesh Overlay Contributors

//! The [`PeerId`] type: a stable hex identifier bound to a node's Ed25519
//! identity public key.

use core::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};
use displaydoc::Display as DisplayDoc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Errors produced while parsing or validating a [`PeerId`].
#[derive(Debug, DisplayDoc, Eq, PartialEq, Clone)]
pub enum PeerIdError {
    /// peer id must be exactly 64 lowercase hex characters, got {0} characters
    WrongLength(usize),
    /// peer id contains non-hex or uppercase characters: {0}
    NotLowerHex(String),
}

impl std::error::Error for PeerIdError {}

/// A stable hex identifier of a node, bound to its Ed25519 identity public
/// key: `PeerId == hex(SHA256(identity_public_key))`.
///
/// Immutable for the lifetime of a node; used as the DHT key for its
/// descriptor.
#[derive(Clone, Debug, Default, Eq, PartialEq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeerId(String);

impl PeerId {
    /// Derive a `PeerId` from a 32-byte Ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        let digest = Sha256::digest(public_key);
        Self(hex::encode(digest))
    }

    /// Borrow the canonical lowercase-hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Verify that this id is bound to the given public key.
    pub fn matches_public_key(&self, public_key: &[u8; 32]) -> bool {
        *self == Self::from_public_key(public_key)
    }
}

impl Display for PeerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PeerId {
    type Err = PeerIdError;

    fn from_str(src: &str) -> Result<Self, Self::Err> {
        if src.len() != 64 {
            return Err(PeerIdError::WrongLength(src.len()));
        }
        if !src.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase()) {
            return Err(PeerIdError::NotLowerHex(src.to_string()));
        }
        Ok(Self(src.to_string()))
    }
}

impl AsRef<str> for PeerId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
