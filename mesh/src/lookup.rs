// Copyright (c) 2024 Mesh Overlay Contributors

//! k-of-n consensus targeted lookup (§4.6): query several candidate peers
//! for one key over `REQKEY`/`RESPKEY` and accept the first group of
//! answers that agrees `ConsensusMinAgreements` times.

use async_trait::async_trait;
use mesh_common::error::{MeshError, MeshResult};
use mesh_common::PeerId;
use mesh_control::{ControlEnvelope, EnvelopeType, PeerContext};
use mesh_gossip::{resolve_consensus, HashEntry};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::dispatch::{decode, encode, sign_payload};
use crate::payloads::{ReqKeyPayload, RespKeyPayload};
use crate::session::recv_verified;
use crate::state::NodeState;
use crate::time::now_ms;
use crate::codec::send_envelope;

/// Opens a fresh control-plane stream to a peer. Isolates the lookup driver
/// from connection management the way [`mesh_gossip::HashDbService`] and
/// friends isolate it from storage: `node` supplies the real QUIC-backed
/// implementation, tests supply an in-memory one.
#[async_trait]
pub trait StreamDialer: Send + Sync {
    /// Open a bidirectional control stream to `peer`, returning the
    /// verification context for envelopes received on it.
    async fn open_control_stream(
        &self,
        peer: &PeerId,
    ) -> MeshResult<(
        Box<dyn AsyncRead + Unpin + Send>,
        Box<dyn AsyncWrite + Unpin + Send>,
        PeerContext,
    )>;
}

async fn query_one(
    peer: &PeerId,
    flac_key: &str,
    dialer: &dyn StreamDialer,
    state: &NodeState,
) -> MeshResult<Option<HashEntry>> {
    let (mut recv, mut send, ctx) = dialer.open_control_stream(peer).await?;
    let request = ReqKeyPayload {
        flac_key: flac_key.to_string(),
    };
    let now = now_ms();
    let envelope = sign_payload(state, EnvelopeType::ReqKey, now, encode(&request)?);
    send_envelope(&mut send, &envelope).await?;

    let Some(reply) = recv_verified(&mut recv, &ctx, state).await? else {
        return Err(MeshError::transport_error("connection closed awaiting RESPKEY"));
    };
    expect_resp_key(&reply)?;
    let response: RespKeyPayload = decode(&reply.payload)?;
    Ok(response.entry.filter(|_| response.found))
}

fn expect_resp_key(envelope: &ControlEnvelope) -> MeshResult<()> {
    if envelope.kind == EnvelopeType::RespKey {
        Ok(())
    } else {
        Err(MeshError::protocol_violation("expected RESPKEY"))
    }
}

/// Query up to `ConsensusMinPeers` of `candidates` for `flac_key` and return
/// the entry `ConsensusMinAgreements` of them agree on. Peers that fail to
/// answer (timeout, transport error, malformed reply) simply don't
/// contribute a vote; they do not abort the lookup. A key already held in
/// this node's own hash database resolves immediately, with no network
/// round trips at all.
pub async fn lookup_hash(
    flac_key: &str,
    candidates: &[PeerId],
    dialer: &dyn StreamDialer,
    state: &NodeState,
) -> MeshResult<HashEntry> {
    if let Some(entry) = state.hashdb.lookup(flac_key).await {
        return Ok(entry);
    }

    let want = state.config.gossip.consensus_min_peers as usize;
    let mut answers = Vec::new();
    for peer in candidates.iter().take(want.max(1)) {
        match query_one(peer, flac_key, dialer, state).await {
            Ok(Some(entry)) => answers.push(entry),
            Ok(None) => {}
            Err(e) => tracing::debug!(%peer, error = %e, "lookup query failed"),
        }
    }
    resolve_consensus(&answers, state.config.gossip.consensus_min_agreements).map_err(MeshError::from)
}
