// Copyright (c) 2024 Mesh Overlay Contributors

//! End-to-end exercises of the active-side sync driver and the consensus
//! lookup driver over an in-memory loopback transport, with no real QUIC
//! endpoint involved.

use std::sync::Arc;
use std::time::Duration;

use mesh::{drive_sync_cycle, lookup_hash, NodeState, StreamDialer};
use mesh_certs::CertificateStore;
use mesh_common::config::{GossipConfig, MeshConfig};
use mesh_common::PeerId;
use mesh_control::PeerContext;
use mesh_directory::{PeerDirectory, TransportKind};
use mesh_gossip::hashdb::tests_support::InMemoryHashDb;
use mesh_gossip::{HashEntry, NoopReputation, RootedPathResolver};
use mesh_test_support::{ephemeral_identity, EphemeralIdentity, InMemoryDht, LoopbackDialer};

fn entry(seq_id: i64, key: &str, hash_byte: char) -> HashEntry {
    HashEntry {
        seq_id,
        flac_key: key.to_string(),
        byte_hash_hex: hash_byte.to_string().repeat(64),
        size: 1_000,
        meta_flags: None,
    }
}

fn test_config() -> MeshConfig {
    let mut config = MeshConfig::default();
    // Proof-of-possession round trips need a populated share root on disk;
    // these tests only exercise delta merge and tracker transitions.
    config.gossip.pop_enabled = false;
    config
}

/// A node's live state plus everything that must outlive it (identity's
/// temp dir, certs/share-root temp dirs).
struct TestNode {
    state: Arc<NodeState>,
    identity: EphemeralIdentity,
    hashdb: Arc<InMemoryHashDb>,
    _certs_dir: tempfile::TempDir,
    _share_dir: tempfile::TempDir,
}

impl TestNode {
    fn peer_id(&self) -> PeerId {
        self.identity.store.peer_id().clone()
    }

    fn as_seen_by_others(&self, remote_endpoint: impl Into<String>) -> PeerContext {
        PeerContext {
            peer_id: self.peer_id(),
            remote_endpoint: remote_endpoint.into(),
            transport: TransportKind::DirectQuic,
            allowed_control_signing_keys: vec![self.identity.store.public_key()],
        }
    }
}

fn build_test_node(config: MeshConfig) -> TestNode {
    let identity = ephemeral_identity();

    let certs_dir = tempfile::tempdir().unwrap();
    let certs = Arc::new(
        CertificateStore::open(
            certs_dir.path().join("certs"),
            certs_dir.path().join("mesh-pins.json"),
            Duration::from_secs(60),
        )
        .unwrap(),
    );

    let share_dir = tempfile::tempdir().unwrap();
    let path_resolver = Arc::new(RootedPathResolver::new(share_dir.path()));

    let directory = Arc::new(PeerDirectory::new(
        Box::new(InMemoryDht::new()),
        Duration::from_secs(300),
        Duration::from_secs(300),
        3_600_000,
    ));

    let hashdb = Arc::new(InMemoryHashDb::new());
    let state = Arc::new(NodeState::new(
        identity.store.clone(),
        certs,
        directory,
        hashdb.clone(),
        path_resolver,
        Arc::new(NoopReputation),
        config,
    ));

    TestNode {
        state,
        identity,
        hashdb,
        _certs_dir: certs_dir,
        _share_dir: share_dir,
    }
}

#[tokio::test]
async fn drive_sync_cycle_pulls_and_merges_remote_entries() {
    let caller = build_test_node(test_config());
    let remote = build_test_node(test_config());

    remote
        .hashdb
        .seed(vec![
            entry(1, "song-one.flac", 'a'),
            entry(2, "song-two.flac", 'b'),
        ])
        .await;

    let mut dialer = LoopbackDialer::new(caller.as_seen_by_others("loopback:caller"));
    dialer.register(
        remote.peer_id(),
        remote.state.clone(),
        remote.as_seen_by_others("loopback:remote"),
    );

    let (recv, send, ctx) = dialer.open_control_stream(&remote.peer_id()).await.unwrap();
    drive_sync_cycle(recv, send, ctx, &caller.state).await.unwrap();

    assert!(caller.state.hashdb.lookup("song-one.flac").await.is_some());
    assert!(caller.state.hashdb.lookup("song-two.flac").await.is_some());
}

#[tokio::test]
async fn lookup_hash_resolves_via_consensus() {
    let mut config = test_config();
    config.gossip = GossipConfig {
        consensus_min_peers: 3,
        consensus_min_agreements: 2,
        ..config.gossip
    };
    let caller = build_test_node(config);

    let mut dialer = LoopbackDialer::new(caller.as_seen_by_others("loopback:caller"));
    let mut candidates = Vec::new();
    let mut answering_peers = Vec::new();
    for i in 0..3u8 {
        let peer = build_test_node(test_config());
        peer.hashdb.seed(vec![entry(1, "shared.flac", 'c')]).await;
        let peer_id = peer.peer_id();
        dialer.register(
            peer_id.clone(),
            peer.state.clone(),
            peer.as_seen_by_others(format!("loopback:{i}")),
        );
        candidates.push(peer_id);
        answering_peers.push(peer);
    }

    let resolved = lookup_hash("shared.flac", &candidates, &dialer, &caller.state)
        .await
        .unwrap();
    assert_eq!(resolved.flac_key, "shared.flac");
    assert_eq!(answering_peers.len(), 3);
}
