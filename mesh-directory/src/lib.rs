// Copyright (c) 2024 Mesh Overlay Contributors

//! PeerDirectory (C3): signed peer descriptor publish/fetch via a DHT,
//! endpoint-to-`PeerId` reverse lookup, and a verified, bounded-TTL cache.

#![warn(missing_docs)]

pub mod descriptor;
pub mod dht;
pub mod directory;
pub mod error;

pub use descriptor::{Endpoint, NatType, PeerDescriptor, Scope, TransportKind};
pub use dht::MeshDhtClient;
pub use directory::PeerDirectory;
pub use error::{DirectoryError, DirectoryResult};
