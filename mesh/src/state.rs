// Copyright (c) 2024 Mesh Overlay Contributors

//! Shared node state: every collaborator and piece of per-peer bookkeeping
//! a connection handler or the sync driver needs, bundled behind `Arc` so
//! it can be cloned cheaply into spawned tasks (mirroring the teacher's
//! `SharedPeerStore` pattern of one `Arc`-wrapped record per long-running
//! service).

use std::collections::HashMap;
use std::sync::Arc;

use mesh_certs::CertificateStore;
use mesh_common::config::MeshConfig;
use mesh_common::metrics::MeshMetrics;
use mesh_common::PeerId;
use mesh_control::ReplayCache;
use mesh_crypto::identity::IdentityStore;
use mesh_directory::PeerDirectory;
use mesh_gossip::{GossipRateLimiter, HashDbService, PathResolver, PeerReputation, PeerSyncTracker};
use mesh_neighbors::NeighborManager;
use tokio::sync::Mutex;

/// Everything a per-connection session or the sync driver needs, shared
/// across every concurrent connection this node holds.
pub struct NodeState {
    /// This node's own identity.
    pub identity: Arc<IdentityStore>,
    /// Per-plane certificate/pin store.
    pub certs: Arc<CertificateStore>,
    /// Descriptor publish/fetch/cache.
    pub directory: Arc<PeerDirectory>,
    /// Hash-database collaborator.
    pub hashdb: Arc<dyn HashDbService>,
    /// Share-root path resolver for chunk service.
    pub path_resolver: Arc<dyn PathResolver>,
    /// Peer reputation collaborator.
    pub reputation: Arc<dyn PeerReputation>,
    /// Small-world neighbor manager.
    pub neighbors: Arc<NeighborManager>,
    /// Config section knobs this node was built from.
    pub config: MeshConfig,
    /// Exported counters.
    pub metrics: Arc<MeshMetrics>,
    /// Replay defense, shared across every connection.
    pub replay: Mutex<ReplayCache>,
    /// Invalid-entry/invalid-message rate limiting and quarantine.
    pub rate_limiter: Mutex<GossipRateLimiter>,
    /// Per-peer delta-sync state machines.
    pub sync_trackers: Mutex<HashMap<PeerId, PeerSyncTracker>>,
}

impl NodeState {
    /// Build fresh node state from its collaborators and configuration.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<IdentityStore>,
        certs: Arc<CertificateStore>,
        directory: Arc<PeerDirectory>,
        hashdb: Arc<dyn HashDbService>,
        path_resolver: Arc<dyn PathResolver>,
        reputation: Arc<dyn PeerReputation>,
        config: MeshConfig,
    ) -> Self {
        let rate_limiter = GossipRateLimiter::new(&config.gossip);
        let replay_ttl_ms = (config.control.replay_window.as_millis() as u64).max(1);
        let neighbors = Arc::new(NeighborManager::new(config.neighbors.clone()));
        Self {
            identity,
            certs,
            directory,
            hashdb,
            path_resolver,
            reputation,
            neighbors,
            config,
            metrics: Arc::new(MeshMetrics::new()),
            replay: Mutex::new(ReplayCache::new(replay_ttl_ms)),
            rate_limiter: Mutex::new(rate_limiter),
            sync_trackers: Mutex::new(HashMap::new()),
        }
    }

    /// The tracker for `peer`, creating a fresh `Idle` one on first use.
    pub async fn tracker_for(&self, peer: &PeerId) -> PeerSyncTracker {
        let mut trackers = self.sync_trackers.lock().await;
        *trackers.entry(peer.clone()).or_insert_with(PeerSyncTracker::new)
    }

    /// Store an updated tracker for `peer`.
    pub async fn set_tracker(&self, peer: &PeerId, tracker: PeerSyncTracker) {
        self.sync_trackers.lock().await.insert(peer.clone(), tracker);
    }
}
