// Copyright (c) 2024 Mesh Overlay Contributors

//! The `MeshDhtClient` trait: the boundary between descriptor publish/fetch
//! logic and whatever DHT implementation backs it. Kept trait-object-safe
//! via `async-trait` so the rest of the crate never depends on a concrete
//! DHT library.

use async_trait::async_trait;

use crate::error::DirectoryResult;

/// A key-value DHT capable of storing and retrieving signed, opaque byte
/// blobs (serialized [`crate::descriptor::PeerDescriptor`] values) with a
/// bounded time-to-live.
#[async_trait]
pub trait MeshDhtClient: Send + Sync {
    /// Store `value` under `key`, expiring after `ttl_ms` milliseconds.
    /// Republishing the same key before expiry refreshes the TTL.
    async fn put(&self, key: &[u8], value: Vec<u8>, ttl_ms: u64) -> DirectoryResult<()>;

    /// Fetch the value stored under `key`, or `Ok(None)` if absent or
    /// expired.
    async fn get(&self, key: &[u8]) -> DirectoryResult<Option<Vec<u8>>>;
}


#[cfg(test)]
mod tests {
    use super::tests_support::InMemoryDht;
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dht = InMemoryDht::default();
        dht.put(b"key", b"value".to_vec(), 1000).await.unwrap();
        let value = dht.get(b"key").await.unwrap();
        assert_eq!(value, Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn get_on_missing_key_returns_none() {
        let dht = InMemoryDht::default();
        assert_eq!(dht.get(b"missing").await.unwrap(), None);
    }
}
