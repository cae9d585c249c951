// Copyright (c) 2024 Mesh Overlay Contributors

//! Symmetric per-envelope handling (§4.5/§4.6): both sides of a connection
//! run the same dispatch over whatever arrives next, so "client" and
//! "server" differ only in who sends the first `HELLO` onto a fresh
//! stream — every envelope after that is handled identically regardless of
//! which side opened the connection.

use base64::Engine;
use mesh_common::error::{MeshError, MeshResult};
use mesh_common::PeerId;
use mesh_control::{ControlEnvelope, EnvelopeType, PeerContext};
use mesh_gossip::sync::SyncState;
use mesh_gossip::{validate_consistency, validate_structural, HashEntry};

use crate::payloads::{
    AckPayload, HelloPayload, PushDeltaPayload, ReqChunkPayload, ReqDeltaPayload, ReqKeyPayload,
    RespChunkPayload, RespKeyPayload,
};
use crate::state::NodeState;

pub(crate) fn sign_payload(state: &NodeState, kind: EnvelopeType, now_ms: u64, payload: Vec<u8>) -> ControlEnvelope {
    let signer_key_id = Some(state.identity.public_key());
    ControlEnvelope::new_signed(kind, now_ms, payload, signer_key_id, |data| state.identity.sign(data))
}

pub(crate) fn encode(value: &impl serde::Serialize) -> MeshResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| MeshError::protocol_violation(format!("payload encode failed: {e}")))
}

pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> MeshResult<T> {
    serde_json::from_slice(bytes).map_err(|e| MeshError::protocol_violation(format!("payload decode failed: {e}")))
}

/// Reject `peer`'s traffic outright while it is quarantined (§8 property 9).
async fn admission_check(state: &NodeState, peer: &PeerId, now_ms: u64) -> MeshResult<()> {
    state
        .rate_limiter
        .lock()
        .await
        .check_admission(peer, now_ms)
        .map_err(MeshError::from)
}

async fn handle_hello(state: &NodeState, peer: &PeerId, payload: &[u8], now_ms: u64) -> MeshResult<Option<ControlEnvelope>> {
    let Ok(_incoming) = decode::<HelloPayload>(payload) else {
        state.rate_limiter.lock().await.record_invalid_message(peer, now_ms);
        state.reputation.record_malformed_message(peer);
        return Ok(None);
    };

    {
        let mut trackers = state.sync_trackers.lock().await;
        let tracker = trackers.entry(peer.clone()).or_insert_with(mesh_gossip::PeerSyncTracker::new);
        let stall_timeout_ms = state.config.control.envelope_round_trip_timeout.as_millis() as u64;
        if tracker.eligible_to_start(now_ms, stall_timeout_ms) {
            let _ = tracker.advance(SyncState::Greeting, now_ms, None);
        }
    }

    let latest_seq_id = state.hashdb.current_seq_id().await;
    let reply = HelloPayload {
        client_id: "mesh-overlay".to_string(),
        client_version: env!("CARGO_PKG_VERSION").to_string(),
        latest_seq_id,
        hash_count: (latest_seq_id + 1).max(0) as u64,
    };
    Ok(Some(sign_payload(state, EnvelopeType::Hello, now_ms, encode(&reply)?)))
}

async fn handle_req_delta(state: &NodeState, peer: &PeerId, payload: &[u8], now_ms: u64) -> MeshResult<Option<ControlEnvelope>> {
    let Ok(request) = decode::<ReqDeltaPayload>(payload) else {
        state.rate_limiter.lock().await.record_invalid_message(peer, now_ms);
        state.reputation.record_malformed_message(peer);
        return Ok(None);
    };

    {
        let mut trackers = state.sync_trackers.lock().await;
        if let Some(tracker) = trackers.get_mut(peer) {
            if tracker.state() == SyncState::Greeting {
                let _ = tracker.advance(SyncState::Delivering, now_ms, None);
            }
        }
    }

    let cap = request.max_entries.min(state.config.gossip.max_delta_entries);
    let entries = state.hashdb.entries_since(request.since_seq_id, cap).await;
    let latest_seq_id = state.hashdb.current_seq_id().await;
    let remaining = (latest_seq_id - request.since_seq_id).max(0) as u64;
    let has_more = entries.len() as u32 == cap && remaining > cap as u64;
    let reply = PushDeltaPayload {
        entries,
        latest_seq_id,
        has_more,
    };
    Ok(Some(sign_payload(state, EnvelopeType::PushDelta, now_ms, encode(&reply)?)))
}

async fn handle_push_delta(state: &NodeState, peer: &PeerId, payload: &[u8], now_ms: u64) -> MeshResult<Option<ControlEnvelope>> {
    let Ok(push) = decode::<PushDeltaPayload>(payload) else {
        state.rate_limiter.lock().await.record_invalid_message(peer, now_ms);
        state.reputation.record_malformed_message(peer);
        return Ok(None);
    };

    if validate_consistency(&push.entries).is_err() {
        state.rate_limiter.lock().await.record_invalid_message(peer, now_ms);
        state.reputation.record_malformed_message(peer);
        return Ok(None);
    }

    let mut valid: Vec<HashEntry> = Vec::with_capacity(push.entries.len());
    for entry in push.entries {
        match validate_structural(
            &entry,
            state.config.gossip.max_flac_key_len,
            state.config.gossip.max_entry_size_bytes,
        ) {
            Ok(()) => valid.push(entry),
            Err(_) => {
                state.rate_limiter.lock().await.record_invalid_entry(peer, now_ms);
                state.reputation.record_protocol_violation(peer, "invalid hash entry");
            }
        }
    }

    // An unsolicited push arrives as a single self-contained envelope, with
    // no access to the raw stream a nested REQCHUNK/RESPCHUNK round trip
    // would need (unlike `sync::drive_sync_cycle`, which owns the stream
    // directly and always proves an unknown entry before merging it). So a
    // not-yet-known entry is dropped here rather than merged unproven; it
    // still reaches this node once a scheduled sync cycle pulls and proves
    // it from whoever actually holds the file.
    let mut proven = Vec::with_capacity(valid.len());
    for entry in valid {
        if !state.config.gossip.pop_enabled || state.hashdb.lookup(&entry.flac_key).await.is_some() {
            proven.push(entry);
        } else {
            tracing::debug!(%peer, flac_key = %entry.flac_key, "dropping unproven entry from unsolicited push");
        }
    }

    let merged_count = state.hashdb.merge(proven).await;

    {
        let mut trackers = state.sync_trackers.lock().await;
        if let Some(tracker) = trackers.get_mut(peer) {
            tracker.record_observed_seq_id(push.latest_seq_id);
        }
    }

    let reply = AckPayload {
        merged_count,
        latest_seq_id: state.hashdb.current_seq_id().await,
    };
    Ok(Some(sign_payload(state, EnvelopeType::Ack, now_ms, encode(&reply)?)))
}

async fn handle_ack(state: &NodeState, peer: &PeerId, payload: &[u8], now_ms: u64) -> MeshResult<Option<ControlEnvelope>> {
    let Ok(ack) = decode::<AckPayload>(payload) else {
        state.rate_limiter.lock().await.record_invalid_message(peer, now_ms);
        return Ok(None);
    };

    {
        let mut trackers = state.sync_trackers.lock().await;
        if let Some(tracker) = trackers.get_mut(peer) {
            tracker.record_observed_seq_id(ack.latest_seq_id);
            if tracker.state() == SyncState::Delivering {
                let _ = tracker.advance(SyncState::Settling, now_ms, None);
                let cooldown_until = now_ms + state.config.gossip.sync_interval.as_millis() as u64;
                let _ = tracker.advance(SyncState::Cooldown, now_ms, Some(cooldown_until));
            }
        }
    }

    tracing::debug!(%peer, merged = ack.merged_count, "peer acknowledged delta push");
    Ok(None)
}

async fn handle_req_key(state: &NodeState, peer: &PeerId, payload: &[u8], now_ms: u64) -> MeshResult<Option<ControlEnvelope>> {
    let Ok(request) = decode::<ReqKeyPayload>(payload) else {
        state.rate_limiter.lock().await.record_invalid_message(peer, now_ms);
        return Ok(None);
    };
    let entry = state.hashdb.lookup(&request.flac_key).await;
    let reply = RespKeyPayload {
        found: entry.is_some(),
        entry,
    };
    Ok(Some(sign_payload(state, EnvelopeType::RespKey, now_ms, encode(&reply)?)))
}

async fn handle_resp_key(_state: &NodeState, _peer: &PeerId, _payload: &[u8], _now_ms: u64) -> MeshResult<Option<ControlEnvelope>> {
    // Consensus grouping over multiple peers' RESPKEY answers happens in the
    // lookup driver (see `lookup::lookup_hash`), which collects raw answers
    // itself rather than routing them back through this per-connection
    // dispatcher.
    Ok(None)
}

async fn handle_req_chunk(state: &NodeState, peer: &PeerId, payload: &[u8], now_ms: u64) -> MeshResult<Option<ControlEnvelope>> {
    let Ok(request) = decode::<ReqChunkPayload>(payload) else {
        state.rate_limiter.lock().await.record_invalid_message(peer, now_ms);
        return Ok(None);
    };

    let length = (request.length as usize).min(state.config.gossip.max_chunk_length_bytes);
    let data = resolve_and_read_chunk(state, &request.flac_key, request.offset, length);
    let reply = match data {
        Some(bytes) => {
            state.metrics.chunk_served("ok");
            RespChunkPayload {
                success: true,
                data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            }
        }
        None => {
            state.metrics.chunk_served("denied");
            RespChunkPayload {
                success: false,
                data_base64: String::new(),
            }
        }
    };
    let _ = peer;
    Ok(Some(sign_payload(state, EnvelopeType::RespChunk, now_ms, encode(&reply)?)))
}

fn resolve_and_read_chunk(state: &NodeState, flac_key: &str, offset: u64, length: usize) -> Option<Vec<u8>> {
    use std::io::{Read, Seek, SeekFrom};
    let path = state.path_resolver.resolve_path(flac_key)?;
    let mut file = std::fs::File::open(path).ok()?;
    file.seek(SeekFrom::Start(offset)).ok()?;
    let mut buf = vec![0u8; length];
    let read = file.read(&mut buf).ok()?;
    buf.truncate(read);
    Some(buf)
}

async fn handle_resp_chunk(_state: &NodeState, _peer: &PeerId, _payload: &[u8], _now_ms: u64) -> MeshResult<Option<ControlEnvelope>> {
    // Proof-of-possession and chunk-download responses are consumed by
    // whichever driver issued the matching REQCHUNK (see `sync::drive_sync_cycle`),
    // which reads the reply directly off the stream rather than through this
    // dispatcher.
    Ok(None)
}

/// Route one verified, admitted envelope to its handler, returning a signed
/// response envelope when the handler produces one.
pub async fn dispatch_async(
    envelope: &ControlEnvelope,
    ctx: &PeerContext,
    state: &NodeState,
    now_ms: u64,
) -> MeshResult<Option<ControlEnvelope>> {
    if state.reputation.is_untrusted(&ctx.peer_id) {
        return Ok(None);
    }
    admission_check(state, &ctx.peer_id, now_ms).await?;

    match envelope.kind {
        EnvelopeType::Hello => handle_hello(state, &ctx.peer_id, &envelope.payload, now_ms).await,
        EnvelopeType::ReqDelta => handle_req_delta(state, &ctx.peer_id, &envelope.payload, now_ms).await,
        EnvelopeType::PushDelta => handle_push_delta(state, &ctx.peer_id, &envelope.payload, now_ms).await,
        EnvelopeType::Ack => handle_ack(state, &ctx.peer_id, &envelope.payload, now_ms).await,
        EnvelopeType::ReqKey => handle_req_key(state, &ctx.peer_id, &envelope.payload, now_ms).await,
        EnvelopeType::RespKey => handle_resp_key(state, &ctx.peer_id, &envelope.payload, now_ms).await,
        EnvelopeType::ReqChunk => handle_req_chunk(state, &ctx.peer_id, &envelope.payload, now_ms).await,
        EnvelopeType::RespChunk => handle_resp_chunk(state, &ctx.peer_id, &envelope.payload, now_ms).await,
    }
}
