// Copyright (c) 2024 Mesh Overlay Contributors

//! Active-side delta-sync driver (§4.6): the one piece of the protocol that
//! is genuinely asymmetric. Whichever side opens a connection to pull a
//! peer's backlog owns the stream directly and runs the full
//! `HELLO -> REQDELTA -> PUSHDELTA -> (optional REQCHUNK proof-of-possession)
//! -> ACK` sequence itself, rather than going through the passive per-
//! envelope responder in [`crate::dispatch`] (which still handles an
//! unsolicited `PUSHDELTA` arriving outside of a cycle it drove).

use base64::Engine;
use mesh_common::error::{MeshError, MeshResult};
use mesh_control::{EnvelopeType, PeerContext};
use mesh_gossip::sync::SyncState;
use mesh_gossip::{validate_consistency, validate_structural, verify_proof_of_possession, HashEntry};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::dispatch::{decode, encode, sign_payload};
use crate::payloads::{
    AckPayload, HelloPayload, PushDeltaPayload, ReqChunkPayload, ReqDeltaPayload, RespChunkPayload,
};
use crate::session::recv_verified;
use crate::state::NodeState;
use crate::time::now_ms;
use crate::codec::send_envelope;

async fn request_proof_of_possession<R, W>(
    recv: &mut R,
    send: &mut W,
    ctx: &PeerContext,
    state: &NodeState,
    entry: &HashEntry,
) -> MeshResult<bool>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let now = now_ms();
    let request = ReqChunkPayload {
        flac_key: entry.flac_key.clone(),
        offset: 0,
        length: state.config.gossip.pop_prefix_bytes as u32,
    };
    let envelope = sign_payload(state, EnvelopeType::ReqChunk, now, encode(&request)?);
    send_envelope(send, &envelope).await?;

    let Some(reply) = recv_verified(recv, ctx, state).await? else {
        return Err(MeshError::transport_error("connection closed awaiting RESPCHUNK"));
    };
    if reply.kind != EnvelopeType::RespChunk {
        return Err(MeshError::protocol_violation("expected RESPCHUNK in proof-of-possession exchange"));
    }
    let response: RespChunkPayload = decode(&reply.payload)?;
    if !response.success {
        return Ok(false);
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(response.data_base64)
        .map_err(|e| MeshError::protocol_violation(format!("invalid base64 in RESPCHUNK: {e}")))?;
    Ok(verify_proof_of_possession(
        &entry.byte_hash_hex,
        entry.size,
        state.config.gossip.pop_prefix_bytes,
        &bytes,
    )
    .is_ok())
}

/// Drive one full delta-sync cycle against `ctx.peer_id` over a freshly
/// opened bidirectional stream, doing nothing if the peer's tracker is not
/// currently eligible to start one (still cooling down from a prior cycle).
pub async fn drive_sync_cycle<R, W>(
    mut recv: R,
    mut send: W,
    ctx: PeerContext,
    state: &NodeState,
) -> MeshResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let now = now_ms();
    let mut tracker = state.tracker_for(&ctx.peer_id).await;
    let stall_timeout_ms = state.config.control.envelope_round_trip_timeout.as_millis() as u64;
    if !tracker.eligible_to_start(now, stall_timeout_ms) {
        return Ok(());
    }

    let latest_seq_id = state.hashdb.current_seq_id().await;
    let hello = HelloPayload {
        client_id: "mesh-overlay".to_string(),
        client_version: env!("CARGO_PKG_VERSION").to_string(),
        latest_seq_id,
        hash_count: (latest_seq_id + 1).max(0) as u64,
    };
    let envelope = sign_payload(state, EnvelopeType::Hello, now, encode(&hello)?);
    send_envelope(&mut send, &envelope).await?;
    tracker.advance(SyncState::Greeting, now, None).map_err(MeshError::from)?;
    state.set_tracker(&ctx.peer_id, tracker).await;

    let Some(hello_reply) = recv_verified(&mut recv, &ctx, state).await? else {
        return Err(MeshError::transport_error("connection closed awaiting HELLO reply"));
    };
    if hello_reply.kind != EnvelopeType::Hello {
        return Err(MeshError::protocol_violation("expected HELLO reply"));
    }
    let _their_hello: HelloPayload = decode(&hello_reply.payload)?;

    let mut tracker = state.tracker_for(&ctx.peer_id).await;
    tracker.advance(SyncState::Delivering, now_ms(), None).map_err(MeshError::from)?;
    state.set_tracker(&ctx.peer_id, tracker).await;

    let req_delta = ReqDeltaPayload {
        since_seq_id: tracker.since_seq_id(),
        max_entries: state.config.gossip.max_delta_entries,
    };
    let now = now_ms();
    let envelope = sign_payload(state, EnvelopeType::ReqDelta, now, encode(&req_delta)?);
    send_envelope(&mut send, &envelope).await?;

    let Some(push_envelope) = recv_verified(&mut recv, &ctx, state).await? else {
        return Err(MeshError::transport_error("connection closed awaiting PUSHDELTA"));
    };
    if push_envelope.kind != EnvelopeType::PushDelta {
        return Err(MeshError::protocol_violation("expected PUSHDELTA"));
    }
    let push: PushDeltaPayload = decode(&push_envelope.payload)?;

    validate_consistency(&push.entries).map_err(MeshError::from)?;

    let mut structurally_valid = Vec::with_capacity(push.entries.len());
    for entry in push.entries {
        match validate_structural(
            &entry,
            state.config.gossip.max_flac_key_len,
            state.config.gossip.max_entry_size_bytes,
        ) {
            Ok(()) => structurally_valid.push(entry),
            Err(_) => {
                let now = now_ms();
                state.rate_limiter.lock().await.record_invalid_entry(&ctx.peer_id, now);
                state.reputation.record_protocol_violation(&ctx.peer_id, "invalid hash entry");
            }
        }
    }

    let mut proven = Vec::with_capacity(structurally_valid.len());
    for entry in structurally_valid {
        if !state.config.gossip.pop_enabled || state.hashdb.lookup(&entry.flac_key).await.is_some() {
            proven.push(entry);
            continue;
        }
        match request_proof_of_possession(&mut recv, &mut send, &ctx, state, &entry).await {
            Ok(true) => proven.push(entry),
            Ok(false) => {
                tracing::debug!(peer = %ctx.peer_id, flac_key = %entry.flac_key, "proof of possession failed");
            }
            Err(e) => {
                tracing::debug!(peer = %ctx.peer_id, error = %e, "proof of possession request failed");
            }
        }
    }

    let merged_count = state.hashdb.merge(proven).await;

    let mut tracker = state.tracker_for(&ctx.peer_id).await;
    tracker.record_observed_seq_id(push.latest_seq_id);
    let now = now_ms();
    tracker.advance(SyncState::Settling, now, None).map_err(MeshError::from)?;
    let cooldown_until = now + state.config.gossip.sync_interval.as_millis() as u64;
    tracker.advance(SyncState::Cooldown, now, Some(cooldown_until)).map_err(MeshError::from)?;
    state.set_tracker(&ctx.peer_id, tracker).await;

    let ack = AckPayload {
        merged_count,
        latest_seq_id: state.hashdb.current_seq_id().await,
    };
    let envelope = sign_payload(state, EnvelopeType::Ack, now, encode(&ack)?);
    send_envelope(&mut send, &envelope).await?;

    Ok(())
}
