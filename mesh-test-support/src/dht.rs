// Copyright (c) 2024 Mesh Overlay Contributors

//! An in-memory [`MeshDhtClient`] for integration tests. The crate's own
//! `#[cfg(test)]` double (`mesh_directory::dht::tests_support::InMemoryDht`)
//! is `pub(crate)` and unreachable outside that crate, so tests that span
//! crate boundaries need their own copy.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use mesh_directory::{DirectoryError, DirectoryResult, MeshDhtClient};

/// An in-memory `MeshDhtClient`; TTLs are tracked but entries never
/// actually expire, matching the teacher's own in-crate test double.
#[derive(Default)]
pub struct InMemoryDht {
    entries: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
}

impl InMemoryDht {
    /// Build an empty DHT double.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MeshDhtClient for InMemoryDht {
    async fn put(&self, key: &[u8], value: Vec<u8>, _ttl_ms: u64) -> DirectoryResult<()> {
        self.entries
            .lock()
            .map_err(|_| DirectoryError::Malformed("dht lock poisoned".into()))?
            .insert(key.to_vec(), value);
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> DirectoryResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .lock()
            .map_err(|_| DirectoryError::Malformed("dht lock poisoned".into()))?
            .get(key)
            .cloned())
    }
}
