// Copyright (c) 2024 Mesh Overlay Contributors

//! Errors raised while signing, verifying, or dispatching control envelopes.

use displaydoc::Display;
use thiserror::Error;

/// Errors produced by [`crate::envelope`], [`crate::replay`], and
/// [`crate::dispatch`].
#[derive(Debug, Display, Error)]
pub enum ControlError {
    /// envelope timestamp is {skew_ms}ms outside the {max_skew_ms}ms window
    ClockSkew {
        /// Observed absolute skew.
        skew_ms: u64,
        /// Configured maximum.
        max_skew_ms: u64,
    },

    /// envelope (peer, message id) has already been seen within the replay window
    Replayed,

    /// no allowed signing key validated this envelope's signature
    InvalidSignature,

    /// unknown envelope type token: {0}
    UnknownType(String),

    /// payload failed type-specific validation: {0}
    InvalidPayload(String),
}

impl From<ControlError> for mesh_common::MeshError {
    fn from(err: ControlError) -> Self {
        mesh_common::MeshError::protocol_violation(err.to_string())
    }
}

/// Convenience alias for `Result<T, ControlError>`.
pub type ControlResult<T> = Result<T, ControlError>;
