// Copyright (c) 2024 Mesh Overlay Contributors

//! Errors raised while validating, merging, or syncing hash-database entries.

use displaydoc::Display;
use thiserror::Error;

/// Errors produced by [`crate::validate`], [`crate::sync`], and
/// [`crate::consensus`].
#[derive(Debug, Display, Error)]
pub enum GossipError {
    /// flac key fails the allowed-alphabet/length check: {0}
    InvalidFlacKey(String),
    /// byte hash is not 64 lowercase hex characters: {0}
    InvalidByteHash(String),
    /// entry size {size} exceeds the configured cap {cap}
    SizeExceedsCap {
        /// The offending entry's claimed size.
        size: i64,
        /// The configured maximum.
        cap: i64,
    },
    /// negative sequence id: {0}
    NegativeSeqId(i64),
    /// duplicate (flac_key, byte_hash) with conflicting size
    ConflictingSize,
    /// proof of possession failed for flac key {0}
    ProofOfPossessionFailed(String),
    /// peer is quarantined until {quarantine_deadline_ms}
    Quarantined {
        /// Epoch ms at which quarantine lifts.
        quarantine_deadline_ms: u64,
    },
    /// sync state transition from {from} to {to} is not permitted
    InvalidSyncTransition {
        /// Originating state.
        from: &'static str,
        /// Attempted destination state.
        to: &'static str,
    },
    /// consensus did not reach the minimum agreement threshold
    NoConsensus,
    /// path resolution failed: {0}
    PathResolutionFailed(String),
}

impl From<GossipError> for mesh_common::MeshError {
    fn from(err: GossipError) -> Self {
        match err {
            GossipError::InvalidFlacKey(_)
            | GossipError::InvalidByteHash(_)
            | GossipError::SizeExceedsCap { .. }
            | GossipError::NegativeSeqId(_)
            | GossipError::ConflictingSize
            | GossipError::ProofOfPossessionFailed(_)
            | GossipError::InvalidSyncTransition { .. } => {
                mesh_common::MeshError::protocol_violation(err.to_string())
            }
            GossipError::Quarantined { .. } | GossipError::NoConsensus => {
                mesh_common::MeshError::policy_rejection(err.to_string())
            }
            GossipError::PathResolutionFailed(_) => {
                mesh_common::MeshError::temporary_failure(err.to_string())
            }
        }
    }
}

/// Convenience alias for `Result<T, GossipError>`.
pub type GossipResult<T> = Result<T, GossipError>;

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_common::MeshError;

    #[test]
    fn every_variant_maps_to_a_taxonomy_category() {
        let samples = vec![
            GossipError::InvalidFlacKey("x".into()),
            GossipError::InvalidByteHash("x".into()),
            GossipError::SizeExceedsCap { size: 1, cap: 0 },
            GossipError::NegativeSeqId(-1),
            GossipError::ConflictingSize,
            GossipError::ProofOfPossessionFailed("k".into()),
            GossipError::InvalidSyncTransition { from: "a", to: "b" },
            GossipError::Quarantined {
                quarantine_deadline_ms: 0,
            },
            GossipError::NoConsensus,
            GossipError::PathResolutionFailed("x".into()),
        ];
        for err in samples {
            let mapped: MeshError = err.into();
            assert!(!mapped.to_string().is_empty());
        }
    }
}
