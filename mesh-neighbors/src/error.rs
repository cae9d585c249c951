// Copyright (c) 2024 Mesh Overlay Contributors

//! Error type for the neighbor manager, mapped into the crate-wide
//! taxonomy (§7).

use displaydoc::Display as DisplayDoc;
use mesh_common::error::MeshError;
use thiserror::Error;

/// Errors produced while tracking or selecting neighbors.
#[derive(Debug, DisplayDoc, Error, Eq, PartialEq, Clone)]
pub enum NeighborError {
    /// peer is not known as a neighbor or candidate
    UnknownPeer,
    /// candidate pool is full (cap {cap})
    CandidatePoolFull {
        /// configured candidate cap
        cap: usize,
    },
}

impl From<NeighborError> for MeshError {
    fn from(err: NeighborError) -> Self {
        match err {
            NeighborError::UnknownPeer => MeshError::policy_rejection(err.to_string()),
            NeighborError::CandidatePoolFull { .. } => MeshError::temporary_failure(err.to_string()),
        }
    }
}

/// Convenience alias for neighbor-manager results.
pub type NeighborResult<T> = Result<T, NeighborError>;
