// Copyright (c) 2024 Mesh Overlay Contributors

//! Shared primitives used by every mesh overlay crate: the peer identifier
//! newtype, the error taxonomy of §7, the immutable configuration record,
//! canonical length-prefixed encoding, telemetry bootstrap, and exported
//! metrics.

#![warn(missing_docs)]
#![warn(unused_extern_crates)]

pub mod canonical;
pub mod config;
pub mod error;
pub mod metrics;
pub mod peer_id;
pub mod telemetry;

pub use config::MeshConfig;
pub use error::{MeshError, MeshResult};
pub use peer_id::PeerId;
