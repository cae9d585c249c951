// Copyright (c) 2024 Mesh Overlay Contributors

//! Node cryptographic identity (C1): a stable Ed25519 keypair persisted
//! on-disk, signing primitives, and X25519 key material for future
//! handshake use.

#![warn(missing_docs)]

pub mod error;
pub mod identity;
pub mod subkey;

pub use error::{CryptoError, CryptoResult};
pub use identity::IdentityStore;
