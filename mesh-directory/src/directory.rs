// Copyright (c) 2024 Mesh Overlay Contributors

//! [`PeerDirectory`] (C3): publishes this node's own descriptor to the DHT,
//! fetches and verifies others', and keeps a bounded-TTL cache plus an
//! endpoint-to-`PeerId` reverse index for inbound connections that only know
//! the address they were dialed on.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use mesh_common::PeerId;

use crate::descriptor::{Endpoint, PeerDescriptor};
use crate::dht::MeshDhtClient;
use crate::error::{DirectoryError, DirectoryResult};

struct CachedDescriptor {
    descriptor: PeerDescriptor,
    fetched_at: Instant,
}

fn dht_key(peer_id: &PeerId) -> Vec<u8> {
    format!("mesh-overlay/descriptor/{peer_id}").into_bytes()
}

/// Publishes and resolves signed [`PeerDescriptor`]s through a [`MeshDhtClient`].
pub struct PeerDirectory {
    dht: Box<dyn MeshDhtClient>,
    cache: RwLock<HashMap<PeerId, CachedDescriptor>>,
    reverse_index: RwLock<HashMap<(String, u16), (PeerId, Instant)>>,
    cache_ttl: Duration,
    reverse_lookup_max_age: Duration,
    republish_ttl_ms: u64,
}

impl PeerDirectory {
    /// Build a directory over `dht`, caching fetched descriptors for
    /// `cache_ttl` and reverse-lookup entries for `reverse_lookup_max_age`.
    /// `republish_ttl_ms` is the TTL given to this node's own descriptor on
    /// each publish (§4.3 republish interval governs *how often*; this is
    /// *how long* each publish survives in the DHT).
    pub fn new(
        dht: Box<dyn MeshDhtClient>,
        cache_ttl: Duration,
        reverse_lookup_max_age: Duration,
        republish_ttl_ms: u64,
    ) -> Self {
        Self {
            dht,
            cache: RwLock::new(HashMap::new()),
            reverse_index: RwLock::new(HashMap::new()),
            cache_ttl,
            reverse_lookup_max_age,
            republish_ttl_ms,
        }
    }

    /// Publish a freshly signed descriptor for this node. Rejects descriptors
    /// that do not verify rather than trusting the caller.
    pub async fn publish(&self, descriptor: &PeerDescriptor) -> DirectoryResult<()> {
        descriptor.verify()?;
        let key = dht_key(&descriptor.peer_id);
        let bytes = serde_json::to_vec(descriptor)
            .map_err(|e| DirectoryError::Malformed(e.to_string()))?;
        self.dht
            .put(&key, bytes, self.republish_ttl_ms)
            .await
            .map_err(|e| DirectoryError::DhtFailure(e.to_string()))?;
        tracing::debug!(peer_id = %descriptor.peer_id, "published descriptor");
        Ok(())
    }

    /// Fetch and verify the descriptor for `peer_id`, serving from cache when
    /// still fresh, and indexing every endpoint for reverse lookup.
    pub async fn fetch(&self, peer_id: &PeerId) -> DirectoryResult<PeerDescriptor> {
        if let Some(cached) = self.cached_if_fresh(peer_id) {
            return Ok(cached);
        }

        let key = dht_key(peer_id);
        let bytes = self
            .dht
            .get(&key)
            .await
            .map_err(|e| DirectoryError::DhtFailure(e.to_string()))?
            .ok_or_else(|| DirectoryError::NotFound(peer_id.to_string()))?;

        let descriptor: PeerDescriptor =
            serde_json::from_slice(&bytes).map_err(|e| DirectoryError::Malformed(e.to_string()))?;
        descriptor.verify()?;

        if &descriptor.peer_id != peer_id {
            return Err(DirectoryError::PeerIdMismatch {
                claimed: descriptor.peer_id.to_string(),
                derived: peer_id.to_string(),
            });
        }

        self.store_in_cache(descriptor.clone());
        Ok(descriptor)
    }

    /// Resolve an inbound connection's observed `(host, port)` back to a
    /// `PeerId`, if a previously fetched descriptor advertised it and the
    /// index entry has not aged out.
    pub fn reverse_lookup(&self, host: &str, port: u16) -> Option<PeerId> {
        let index = self.reverse_index.read().unwrap();
        let (peer_id, indexed_at) = index.get(&(host.to_string(), port))?;
        if indexed_at.elapsed() > self.reverse_lookup_max_age {
            return None;
        }
        Some(peer_id.clone())
    }

    /// Number of descriptors currently cached.
    pub fn cached_len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    fn cached_if_fresh(&self, peer_id: &PeerId) -> Option<PeerDescriptor> {
        let cache = self.cache.read().unwrap();
        let entry = cache.get(peer_id)?;
        if entry.fetched_at.elapsed() > self.cache_ttl {
            return None;
        }
        Some(entry.descriptor.clone())
    }

    fn store_in_cache(&self, descriptor: PeerDescriptor) {
        let now = Instant::now();
        {
            let mut index = self.reverse_index.write().unwrap();
            for ep in &descriptor.endpoints {
                index.insert(
                    (ep.host.clone(), ep.port),
                    (descriptor.peer_id.clone(), now),
                );
            }
        }
        let mut cache = self.cache.write().unwrap();
        if let Some(existing) = cache.get(&descriptor.peer_id) {
            if !descriptor.is_newer_than(&existing.descriptor) {
                return;
            }
        }
        cache.insert(
            descriptor.peer_id.clone(),
            CachedDescriptor {
                descriptor,
                fetched_at: now,
            },
        );
    }
}

/// Select the preferred reachable endpoint from `endpoints` at `now_ms`:
/// lowest `preference`, tiebroken by lowest `cost`, among endpoints whose
/// validity window covers `now_ms` (§4.4).
pub fn select_endpoint(endpoints: &[Endpoint], now_ms: u64) -> Option<&Endpoint> {
    endpoints
        .iter()
        .filter(|ep| ep.is_valid_at(now_ms))
        .min_by_key(|ep| (ep.preference, ep.cost))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{NatType, Scope, TransportKind};
    use crate::dht::tests_support::InMemoryDht;
    use mesh_crypto::identity::IdentityStore;

    fn fresh_identity() -> IdentityStore {
        let dir = tempfile::tempdir().unwrap();
        IdentityStore::load_or_create(dir.path().join("id.key"), false).unwrap()
    }

    fn sample_descriptor(identity: &IdentityStore, timestamp_ms: u64, port: u16) -> PeerDescriptor {
        let mut desc = PeerDescriptor {
            peer_id: identity.peer_id().clone(),
            endpoints: vec![Endpoint {
                transport_kind: TransportKind::DirectQuic,
                host: "198.51.100.7".into(),
                port,
                scope: Scope::ControlAndData,
                preference: 0,
                cost: 0,
                valid_from_ms: None,
                valid_to_ms: None,
            }],
            nat_type: NatType::Direct,
            relay_required: false,
            timestamp_ms,
            identity_public_key: identity.public_key(),
            tls_control_spki_sha256: [1u8; 32],
            tls_data_spki_sha256: [2u8; 32],
            control_signing_public_keys: vec![identity.public_key()],
            signature: [0u8; 64],
        };
        desc.sign_with(|data| identity.sign(data));
        desc
    }

    fn directory() -> PeerDirectory {
        PeerDirectory::new(
            Box::new(InMemoryDht::default()),
            Duration::from_secs(300),
            Duration::from_secs(3600),
            900_000,
        )
    }

    #[tokio::test]
    async fn publish_then_fetch_round_trips() {
        let identity = fresh_identity();
        let desc = sample_descriptor(&identity, 1000, 4433);
        let dir = directory();

        dir.publish(&desc).await.unwrap();
        let fetched = dir.fetch(&desc.peer_id).await.unwrap();
        assert_eq!(fetched.peer_id, desc.peer_id);
    }

    #[tokio::test]
    async fn fetch_unknown_peer_fails_not_found() {
        let identity = fresh_identity();
        let dir = directory();
        let result = dir.fetch(identity.peer_id()).await;
        assert!(matches!(result, Err(DirectoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn fetch_indexes_endpoints_for_reverse_lookup() {
        let identity = fresh_identity();
        let desc = sample_descriptor(&identity, 1000, 4433);
        let dir = directory();

        dir.publish(&desc).await.unwrap();
        dir.fetch(&desc.peer_id).await.unwrap();

        let resolved = dir.reverse_lookup("198.51.100.7", 4433);
        assert_eq!(resolved, Some(desc.peer_id.clone()));
    }

    #[tokio::test]
    async fn reverse_lookup_on_unknown_endpoint_is_none() {
        let dir = directory();
        assert_eq!(dir.reverse_lookup("203.0.113.1", 1), None);
    }

    #[tokio::test]
    async fn second_fetch_serves_from_cache_without_hitting_dht_again() {
        let identity = fresh_identity();
        let desc = sample_descriptor(&identity, 1000, 4433);
        let dir = directory();
        dir.publish(&desc).await.unwrap();

        dir.fetch(&desc.peer_id).await.unwrap();
        assert_eq!(dir.cached_len(), 1);

        // Even though nothing republished, a second fetch still succeeds and
        // returns the same descriptor from cache.
        let fetched = dir.fetch(&desc.peer_id).await.unwrap();
        assert_eq!(fetched.timestamp_ms, 1000);
    }

    #[test]
    fn select_endpoint_prefers_lowest_preference_then_cost() {
        let cheap = Endpoint {
            transport_kind: TransportKind::DirectQuic,
            host: "a".into(),
            port: 1,
            scope: Scope::Data,
            preference: 0,
            cost: 5,
            valid_from_ms: None,
            valid_to_ms: None,
        };
        let preferred = Endpoint {
            transport_kind: TransportKind::DirectQuic,
            host: "b".into(),
            port: 2,
            scope: Scope::Data,
            preference: 0,
            cost: 1,
            valid_from_ms: None,
            valid_to_ms: None,
        };
        let low_priority = Endpoint {
            transport_kind: TransportKind::DirectQuic,
            host: "c".into(),
            port: 3,
            scope: Scope::Data,
            preference: 5,
            cost: 0,
            valid_from_ms: None,
            valid_to_ms: None,
        };
        let endpoints = vec![cheap, preferred.clone(), low_priority];
        let selected = select_endpoint(&endpoints, 0).unwrap();
        assert_eq!(selected.host, "b");
        let _ = preferred;
    }

    #[test]
    fn select_endpoint_skips_expired_validity_windows() {
        let expired = Endpoint {
            transport_kind: TransportKind::DirectQuic,
            host: "expired".into(),
            port: 1,
            scope: Scope::Data,
            preference: 0,
            cost: 0,
            valid_from_ms: None,
            valid_to_ms: Some(500),
        };
        let live = Endpoint {
            transport_kind: TransportKind::DirectQuic,
            host: "live".into(),
            port: 2,
            scope: Scope::Data,
            preference: 1,
            cost: 0,
            valid_from_ms: None,
            valid_to_ms: None,
        };
        let endpoints = vec![expired, live];
        let selected = select_endpoint(&endpoints, 1000).unwrap();
        assert_eq!(selected.host, "live");
    }
}
