// Copyright (c) 2024 Mesh Overlay Contributors

//! Ephemeral node identities for tests. `IdentityStore` only loads from a
//! file, so a throwaway directory is created per call; keep the returned
//! `TempDir` alive for as long as the identity is in use.

use std::sync::Arc;

use mesh_crypto::identity::IdentityStore;

/// A freshly generated identity backed by a temporary directory that is
/// deleted when dropped.
pub struct EphemeralIdentity {
    _dir: tempfile::TempDir,
    /// The loaded identity, `Arc`-wrapped since that's the form
    /// [`mesh::NodeState`](../../mesh/struct.NodeState.html) expects it in.
    pub store: Arc<IdentityStore>,
}

/// Generate a fresh Ed25519 identity in a throwaway directory.
pub fn ephemeral_identity() -> EphemeralIdentity {
    let dir = tempfile::tempdir().expect("create temp dir for test identity");
    let path = dir.path().join("identity.key");
    let store = IdentityStore::load_or_create(&path, false).expect("generate test identity");
    EphemeralIdentity {
        _dir: dir,
        store: Arc::new(store),
    }
}
