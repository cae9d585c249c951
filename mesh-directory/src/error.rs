// Copyright (c) 2024 Mesh Overlay Contributors

//! Errors raised while building, signing, verifying, publishing, or
//! resolving peer descriptors.

use displaydoc::Display;
use thiserror::Error;

/// Errors produced by [`crate::directory::PeerDirectory`].
#[derive(Debug, Display, Error)]
pub enum DirectoryError {
    /// descriptor signature is invalid
    InvalidSignature,

    /// descriptor PeerId {claimed} does not match hex(SHA256(IdentityPublicKey)) = {derived}
    PeerIdMismatch {
        /// The `PeerId` the descriptor claims.
        claimed: String,
        /// The `PeerId` actually derived from the embedded public key.
        derived: String,
    },

    /// descriptor has no unexpired control signing keys
    NoUnexpiredSigningKeys,

    /// endpoint host {0} does not satisfy its transport kind's domain suffix policy
    InvalidEndpointHost(String),

    /// descriptor not found for peer {0}
    NotFound(String),

    /// DHT operation failed: {0}
    DhtFailure(String),

    /// malformed descriptor bytes: {0}
    Malformed(String),
}

impl From<DirectoryError> for mesh_common::MeshError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::InvalidSignature
            | DirectoryError::PeerIdMismatch { .. }
            | DirectoryError::NoUnexpiredSigningKeys
            | DirectoryError::InvalidEndpointHost(_)
            | DirectoryError::Malformed(_) => {
                mesh_common::MeshError::protocol_violation(err.to_string())
            }
            DirectoryError::NotFound(_) | DirectoryError::DhtFailure(_) => {
                mesh_common::MeshError::temporary_failure(err.to_string())
            }
        }
    }
}

/// Convenience alias for `Result<T, DirectoryError>`.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
