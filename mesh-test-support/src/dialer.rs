// Copyright (c) 2024 Mesh Overlay Contributors

//! An in-memory [`StreamDialer`] for exercising sync and lookup drivers
//! without a real QUIC endpoint: dialing a registered peer spins up a
//! `tokio::io::duplex` pair, spawns that peer's passive session on one
//! end, and hands the other end back to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mesh::{run_passive_session, NodeState, StreamDialer};
use mesh_common::error::{MeshError, MeshResult};
use mesh_common::PeerId;
use mesh_control::PeerContext;
use tokio::io::{AsyncRead, AsyncWrite};

const LOOPBACK_BUFFER_BYTES: usize = 64 * 1024;

struct RegisteredPeer {
    state: Arc<NodeState>,
    context_as_seen_by_caller: PeerContext,
}

/// A registry of in-process nodes, dialable as if they were remote peers.
pub struct LoopbackDialer {
    dialing_as: PeerContext,
    peers: HashMap<PeerId, RegisteredPeer>,
}

impl LoopbackDialer {
    /// Build a dialer that presents `dialing_as` to whichever peer it
    /// connects to.
    pub fn new(dialing_as: PeerContext) -> Self {
        Self {
            dialing_as,
            peers: HashMap::new(),
        }
    }

    /// Register a dialable peer: its live state, plus the context its
    /// envelopes should be verified under from the caller's side.
    pub fn register(&mut self, peer_id: PeerId, state: Arc<NodeState>, context_as_seen_by_caller: PeerContext) {
        self.peers.insert(
            peer_id,
            RegisteredPeer {
                state,
                context_as_seen_by_caller,
            },
        );
    }
}

#[async_trait]
impl StreamDialer for LoopbackDialer {
    async fn open_control_stream(
        &self,
        peer: &PeerId,
    ) -> MeshResult<(
        Box<dyn AsyncRead + Unpin + Send>,
        Box<dyn AsyncWrite + Unpin + Send>,
        PeerContext,
    )> {
        let registered = self
            .peers
            .get(peer)
            .ok_or_else(|| MeshError::temporary_failure("no loopback peer registered under that id"))?;

        let (caller_side, remote_side) = tokio::io::duplex(LOOPBACK_BUFFER_BYTES);
        let (caller_recv, caller_send) = tokio::io::split(caller_side);
        let (remote_recv, remote_send) = tokio::io::split(remote_side);

        let remote_state = registered.state.clone();
        let caller_ctx_for_remote = self.dialing_as.clone();
        tokio::spawn(async move {
            if let Err(e) =
                run_passive_session(remote_recv, remote_send, caller_ctx_for_remote, &remote_state).await
            {
                tracing::debug!(error = %e, "loopback passive session ended with an error");
            }
        });

        Ok((
            Box::new(caller_recv),
            Box::new(caller_send),
            registered.context_as_seen_by_caller.clone(),
        ))
    }
}
