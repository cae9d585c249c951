// Copyright (c) 2024 Mesh Overlay Contributors

#![warn(missing_docs)]

//! Epidemic hash-database sync (§4.6): delta-sync state machine, entry
//! validation pipeline, rate limiting and quarantine, and k-of-n consensus
//! for targeted lookups.

pub mod consensus;
pub mod error;
pub mod hashdb;
pub mod pathresolver;
pub mod rate_limit;
pub mod reputation;
pub mod sync;
pub mod validate;

pub use consensus::resolve_consensus;
pub use error::{GossipError, GossipResult};
pub use hashdb::{HashDbService, HashEntry};
pub use pathresolver::{PathResolver, RootedPathResolver};
pub use rate_limit::GossipRateLimiter;
pub use reputation::{NoopReputation, PeerReputation};
pub use sync::{PeerSyncTracker, SyncState};
pub use validate::{validate_consistency, validate_structural, verify_proof_of_possession};
