// Copyright (c) 2024 Mesh Overlay Contributors

//! Per-`Type` payload schemas carried inside a `ControlEnvelope` (§3/§4.5).
//! Encoded as JSON rather than the literal MessagePack the wire-format
//! section gestures at: `Type` already namespaces the payload, so any
//! self-describing deterministic-field-order encoding satisfies the
//! "versionless because `Type` is namespaced per slot" requirement, and
//! `serde_json` is already load-bearing elsewhere in this codebase
//! (identity and pin persistence).

use mesh_gossip::HashEntry;
use serde::{Deserialize, Serialize};

/// `HELLO` (§4.6 step 1): liveness/capability greeting exchanged on first
/// contact and at the start of every sync cycle.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Human-readable client identifier, e.g. `"mesh-overlay/0.1"`.
    pub client_id: String,
    /// Client version string.
    pub client_version: String,
    /// Sender's current highest `SeqId`.
    pub latest_seq_id: i64,
    /// Sender's total known entry count.
    pub hash_count: u64,
}

/// `REQDELTA` (§4.6 step 2): request entries newer than a watermark.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReqDeltaPayload {
    /// Entries strictly newer than this `SeqId` are requested.
    pub since_seq_id: i64,
    /// Upper bound on returned entries; capped at 1000 by the sender.
    pub max_entries: u32,
}

/// `PUSHDELTA` (§4.6 step 2): the entries satisfying a `REQDELTA`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushDeltaPayload {
    /// Entries ordered by ascending `SeqId`.
    pub entries: Vec<HashEntry>,
    /// The sender's highest `SeqId` as of this push.
    pub latest_seq_id: i64,
    /// Whether more entries remain beyond `max_entries`.
    pub has_more: bool,
}

/// `ACK` (§4.6 step 3): acknowledges a processed `PUSHDELTA`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AckPayload {
    /// Entries actually merged after validation (may be less than sent).
    pub merged_count: usize,
    /// The acknowledging peer's highest `SeqId` after the merge.
    pub latest_seq_id: i64,
}

/// `REQKEY` (§4.6 targeted lookup): ask a peer for one key.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReqKeyPayload {
    /// The key being looked up.
    pub flac_key: String,
}

/// `RESPKEY`: a peer's answer to a `REQKEY`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RespKeyPayload {
    /// Whether the responder holds this key.
    pub found: bool,
    /// The entry, if `found`.
    pub entry: Option<HashEntry>,
}

/// `REQCHUNK` (§4.6 proof-of-possession / chunk service): request a byte
/// range of a shared file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReqChunkPayload {
    /// Key of the file being requested.
    pub flac_key: String,
    /// Byte offset to start reading at.
    pub offset: u64,
    /// Number of bytes requested; capped at 32 KiB by the sender/responder.
    pub length: u32,
}

/// `RESPCHUNK`: the answer to a `REQCHUNK`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RespChunkPayload {
    /// Whether the requested range could be served.
    pub success: bool,
    /// The requested bytes, base64-encoded; empty when `!success`.
    pub data_base64: String,
}
