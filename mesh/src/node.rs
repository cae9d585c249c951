// Copyright (c) 2024 Mesh Overlay Contributors

//! Node wiring and the main event loop (§5): the actor that owns the
//! control-plane QUIC endpoint, accepts inbound connections, runs scheduled
//! neighbor syncs, and answers command-channel requests from the embedder.
//! Mirrors the teacher's `GossipService`/`GossipHandle`/`GossipCommand` actor
//! wrapper: a spawned task owns all mutable state, callers only ever talk to
//! it through channel messages.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use mesh_common::error::{MeshError, MeshResult};
use mesh_common::PeerId;
use mesh_control::PeerContext;
use mesh_directory::directory::select_endpoint;
use mesh_directory::{PeerDirectory, Scope, TransportKind};
use mesh_gossip::HashEntry;
use mesh_transport::QuicEndpoint;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};

use crate::lookup::{self, StreamDialer};
use crate::session::run_passive_session;
use crate::state::NodeState;
use crate::sync::drive_sync_cycle;
use crate::time::now_ms;

/// Commands accepted by a running [`MeshNode`].
pub enum NodeCommand {
    /// Drive one delta-sync cycle against `peer` right now, bypassing the
    /// scheduled interval.
    DriveSync {
        /// The peer to sync with.
        peer: PeerId,
    },
    /// Resolve `flac_key` via k-of-n consensus lookup over `candidates`.
    LookupHash {
        /// The key being looked up.
        flac_key: String,
        /// Peers to query.
        candidates: Vec<PeerId>,
        /// Where to send the result.
        reply: oneshot::Sender<MeshResult<HashEntry>>,
    },
    /// Stop the node's event loop.
    Shutdown,
}

/// A cheap, cloneable handle to a running [`MeshNode`].
#[derive(Clone)]
pub struct NodeHandle {
    command_tx: mpsc::Sender<NodeCommand>,
}

impl NodeHandle {
    /// Ask the node to drive one sync cycle against `peer`.
    pub async fn drive_sync(&self, peer: PeerId) -> MeshResult<()> {
        self.command_tx
            .send(NodeCommand::DriveSync { peer })
            .await
            .map_err(|_| MeshError::transport_error("node event loop is gone"))
    }

    /// Ask the node to resolve `flac_key` via consensus lookup over `candidates`.
    pub async fn lookup_hash(
        &self,
        flac_key: String,
        candidates: Vec<PeerId>,
    ) -> MeshResult<HashEntry> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(NodeCommand::LookupHash {
                flac_key,
                candidates,
                reply,
            })
            .await
            .map_err(|_| MeshError::transport_error("node event loop is gone"))?;
        reply_rx
            .await
            .map_err(|_| MeshError::transport_error("node event loop dropped the reply channel"))?
    }

    /// Stop the node's event loop.
    pub async fn shutdown(&self) {
        let _ = self.command_tx.send(NodeCommand::Shutdown).await;
    }
}

async fn peer_context_for(
    directory: &PeerDirectory,
    peer: &PeerId,
    now_ms: u64,
) -> MeshResult<(SocketAddr, String, PeerContext)> {
    let descriptor = directory.fetch(peer).await?;
    let endpoint = descriptor
        .endpoints
        .iter()
        .filter(|ep| matches!(ep.scope, Scope::Control | Scope::ControlAndData))
        .filter(|ep| ep.transport_kind == TransportKind::DirectQuic)
        .filter(|ep| ep.is_valid_at(now_ms))
        .min_by_key(|ep| (ep.preference, ep.cost))
        .or_else(|| select_endpoint(&descriptor.endpoints, now_ms))
        .ok_or_else(|| MeshError::temporary_failure("peer has no reachable control endpoint"))?;

    let addr: SocketAddr = format!("{}:{}", endpoint.host, endpoint.port)
        .parse()
        .map_err(|_| MeshError::protocol_violation("endpoint host is not dialable as a direct address"))?;

    let ctx = PeerContext {
        peer_id: peer.clone(),
        remote_endpoint: format!("{}:{}", endpoint.host, endpoint.port),
        transport: endpoint.transport_kind,
        allowed_control_signing_keys: descriptor.control_signing_public_keys.clone(),
    };
    Ok((addr, endpoint.host.clone(), ctx))
}

/// Opens control-plane QUIC streams to peers resolved through the directory.
/// Only direct-QUIC endpoints are dialed; Tor/I2P dialing requires a
/// SOCKS5-to-UDP bridge this facade does not provide and is left to a
/// transport-layer embedder.
pub struct QuicStreamDialer {
    control_endpoint: Arc<QuicEndpoint>,
    directory: Arc<PeerDirectory>,
    dial_timeout: std::time::Duration,
}

impl QuicStreamDialer {
    /// Build a dialer over an already-bound control-plane endpoint.
    pub fn new(
        control_endpoint: Arc<QuicEndpoint>,
        directory: Arc<PeerDirectory>,
        dial_timeout: std::time::Duration,
    ) -> Self {
        Self {
            control_endpoint,
            directory,
            dial_timeout,
        }
    }
}

#[async_trait]
impl StreamDialer for QuicStreamDialer {
    async fn open_control_stream(
        &self,
        peer: &PeerId,
    ) -> MeshResult<(
        Box<dyn AsyncRead + Unpin + Send>,
        Box<dyn AsyncWrite + Unpin + Send>,
        PeerContext,
    )> {
        let now = now_ms();
        let (addr, host, ctx) = peer_context_for(&self.directory, peer, now).await?;
        let connection = self
            .control_endpoint
            .dial(addr, &host, self.dial_timeout)
            .await?;
        let (send, recv) = connection
            .open_bi()
            .await
            .map_err(|e| MeshError::transport_error(e.to_string()))?;
        Ok((Box::new(recv), Box::new(send), ctx))
    }
}

/// Everything needed to run a mesh node's accept loop and scheduled syncs.
pub struct MeshNode {
    state: Arc<NodeState>,
    control_endpoint: Arc<QuicEndpoint>,
    dialer: Arc<QuicStreamDialer>,
    command_rx: mpsc::Receiver<NodeCommand>,
    handshake_timeout: std::time::Duration,
}

impl MeshNode {
    /// Build a node and its handle. Call [`MeshNode::run`] (typically via
    /// `tokio::spawn`) to actually start serving.
    pub fn new(
        state: Arc<NodeState>,
        control_endpoint: Arc<QuicEndpoint>,
        directory: Arc<PeerDirectory>,
        dial_timeout: std::time::Duration,
        handshake_timeout: std::time::Duration,
    ) -> (Self, NodeHandle) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let dialer = Arc::new(QuicStreamDialer::new(
            control_endpoint.clone(),
            directory,
            dial_timeout,
        ));
        let node = Self {
            state,
            control_endpoint,
            dialer,
            command_rx,
            handshake_timeout,
        };
        (node, NodeHandle { command_tx })
    }

    async fn accept_one(&self) -> MeshResult<()> {
        let Some(connection) = self.control_endpoint.accept(self.handshake_timeout).await? else {
            return Ok(());
        };
        let remote = connection.remote_address();
        let peer_id = self
            .state
            .directory
            .reverse_lookup(&remote.ip().to_string(), remote.port())
            .ok_or_else(|| MeshError::policy_rejection("inbound connection from unknown endpoint"))?;
        let descriptor = self.state.directory.fetch(&peer_id).await?;
        let ctx = PeerContext {
            peer_id,
            remote_endpoint: remote.to_string(),
            transport: TransportKind::DirectQuic,
            allowed_control_signing_keys: descriptor.control_signing_public_keys,
        };

        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                match connection.accept_bi().await {
                    Ok((send, recv)) => {
                        let ctx = ctx.clone();
                        let state = state.clone();
                        tokio::spawn(async move {
                            if let Err(e) = run_passive_session(recv, send, ctx.clone(), &state).await {
                                tracing::debug!(peer = %ctx.peer_id, error = %e, "session ended with an error");
                            }
                        });
                    }
                    Err(_) => break,
                }
            }
        });
        Ok(())
    }

    async fn handle_command(&self, command: NodeCommand) -> bool {
        match command {
            NodeCommand::DriveSync { peer } => {
                match self.dialer.open_control_stream(&peer).await {
                    Ok((recv, send, ctx)) => {
                        let state = self.state.clone();
                        tokio::spawn(async move {
                            if let Err(e) = drive_sync_cycle(recv, send, ctx.clone(), &state).await {
                                tracing::debug!(peer = %ctx.peer_id, error = %e, "sync cycle failed");
                            }
                        });
                    }
                    Err(e) => tracing::debug!(%peer, error = %e, "could not open sync stream"),
                }
                true
            }
            NodeCommand::LookupHash {
                flac_key,
                candidates,
                reply,
            } => {
                let result = lookup::lookup_hash(&flac_key, &candidates, self.dialer.as_ref(), &self.state).await;
                let _ = reply.send(result);
                true
            }
            NodeCommand::Shutdown => false,
        }
    }

    /// Run the accept loop, scheduled neighbor/random syncs, and command
    /// handling until a [`NodeCommand::Shutdown`] arrives.
    pub async fn run(mut self) {
        let mut neighbor_sync_tick = tokio::time::interval(self.state.config.neighbors.neighbor_sync_interval);
        let mut random_sync_tick = tokio::time::interval(self.state.config.neighbors.random_sync_interval);

        loop {
            tokio::select! {
                accepted = self.accept_one() => {
                    if let Err(e) = accepted {
                        tracing::debug!(error = %e, "inbound connection rejected");
                    }
                }
                _ = neighbor_sync_tick.tick() => {
                    self.spawn_scheduled_syncs().await;
                }
                _ = random_sync_tick.tick() => {
                    self.spawn_scheduled_syncs().await;
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    }

    async fn spawn_scheduled_syncs(&self) {
        let now = now_ms();
        let peers = self
            .state
            .neighbors
            .select_for_sync_cycle(now, self.state.config.gossip.max_peers_per_cycle)
            .await;
        for peer in peers {
            match self.dialer.open_control_stream(&peer).await {
                Ok((recv, send, ctx)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = drive_sync_cycle(recv, send, ctx.clone(), &state).await {
                            tracing::debug!(peer = %ctx.peer_id, error = %e, "scheduled sync failed");
                        }
                    });
                }
                Err(e) => tracing::debug!(%peer, error = %e, "could not open scheduled sync stream"),
            }
        }
    }
}
