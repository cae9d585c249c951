// Copyright (c) 2024 Mesh Overlay Contributors

//! Errors raised while loading, creating, or using node identity material.

use displaydoc::Display;
use thiserror::Error;

/// Errors produced by [`crate::identity::IdentityStore`] and
/// [`crate::subkey`].
#[derive(Debug, Display, Error)]
pub enum CryptoError {
    /// identity file is present but malformed: {0}
    MalformedIdentity(String),

    /// identity file could not be read: {0}
    Io(String),

    /// identity file is missing and regeneration was not requested by the operator
    MissingIdentityRefused,

    /// invalid key bytes: {0}
    InvalidKey(String),

    /// signature verification failed
    VerificationFailed,
}

impl From<std::io::Error> for CryptoError {
    fn from(err: std::io::Error) -> Self {
        CryptoError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::MalformedIdentity(err.to_string())
    }
}

impl From<CryptoError> for mesh_common::MeshError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::VerificationFailed => {
                mesh_common::MeshError::protocol_violation(err.to_string())
            }
            CryptoError::MissingIdentityRefused => {
                mesh_common::MeshError::configuration_error(err.to_string())
            }
            other => mesh_common::MeshError::configuration_error(other.to_string()),
        }
    }
}

/// Convenience alias for `Result<T, CryptoError>`.
pub type CryptoResult<T> = Result<T, CryptoError>;
