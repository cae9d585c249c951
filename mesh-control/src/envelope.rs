// Copyright (c) 2024 Mesh Overlay Contributors

//! [`ControlEnvelope`] (§4.5): the unit of authenticated control-plane
//! message exchange, and the `PeerContext` verification needs to check it
//! against.

use mesh_common::canonical::CanonicalWriter;
use mesh_common::PeerId;
use mesh_directory::TransportKind;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};

/// Known envelope payload kinds (§3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum EnvelopeType {
    /// Peer greeting exchanged on first contact and at sync start.
    Hello,
    /// Request for hash-database entries since a watermark.
    ReqDelta,
    /// Unsolicited push of hash-database entries.
    PushDelta,
    /// Generic acknowledgement.
    Ack,
    /// Targeted lookup request for a specific key.
    ReqKey,
    /// Response to a targeted lookup request.
    RespKey,
    /// Request for a byte range of a shared file.
    ReqChunk,
    /// Response carrying (or declining) requested bytes.
    RespChunk,
}

impl EnvelopeType {
    /// The ASCII token this type canonicalizes to (§3).
    pub fn as_token(self) -> &'static str {
        match self {
            EnvelopeType::Hello => "HELLO",
            EnvelopeType::ReqDelta => "REQDELTA",
            EnvelopeType::PushDelta => "PUSHDELTA",
            EnvelopeType::Ack => "ACK",
            EnvelopeType::ReqKey => "REQKEY",
            EnvelopeType::RespKey => "RESPKEY",
            EnvelopeType::ReqChunk => "REQCHUNK",
            EnvelopeType::RespChunk => "RESPCHUNK",
        }
    }

    /// Parse an ASCII token back into an [`EnvelopeType`].
    pub fn from_token(token: &str) -> ControlResult<Self> {
        match token {
            "HELLO" => Ok(EnvelopeType::Hello),
            "REQDELTA" => Ok(EnvelopeType::ReqDelta),
            "PUSHDELTA" => Ok(EnvelopeType::PushDelta),
            "ACK" => Ok(EnvelopeType::Ack),
            "REQKEY" => Ok(EnvelopeType::ReqKey),
            "RESPKEY" => Ok(EnvelopeType::RespKey),
            "REQCHUNK" => Ok(EnvelopeType::ReqChunk),
            "RESPCHUNK" => Ok(EnvelopeType::RespChunk),
            other => Err(ControlError::UnknownType(other.to_string())),
        }
    }
}

/// A signed control-plane message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ControlEnvelope {
    /// Which kind of message this is; determines how `payload` is parsed.
    pub kind: EnvelopeType,
    /// Sender's local clock at send time.
    pub timestamp_ms: u64,
    /// Random 128-bit id, unique per envelope instance (replay defense key).
    pub message_id: u128,
    /// Optional hint naming which signing key was used.
    pub signer_key_id: Option<[u8; 32]>,
    /// Opaque payload bytes, schema determined by `kind`.
    pub payload: Vec<u8>,
    /// 64-byte Ed25519 signature over `canonical_bytes()`.
    pub signature: [u8; 64],
}

impl ControlEnvelope {
    /// Build and sign a fresh envelope with a random `message_id`.
    pub fn new_signed(
        kind: EnvelopeType,
        timestamp_ms: u64,
        payload: Vec<u8>,
        signer_key_id: Option<[u8; 32]>,
        sign_fn: impl FnOnce(&[u8]) -> [u8; 64],
    ) -> Self {
        let mut message_id_bytes = [0u8; 16];
        rand::rngs::OsRng.fill_bytes(&mut message_id_bytes);
        let message_id = u128::from_le_bytes(message_id_bytes);

        let mut envelope = Self {
            kind,
            timestamp_ms,
            message_id,
            signer_key_id,
            payload,
            signature: [0u8; 64],
        };
        envelope.signature = sign_fn(&envelope.canonical_bytes());
        envelope
    }

    /// Canonicalize `{Type | TimestampMs | MessageId | Payload}` (§3).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut w = CanonicalWriter::new();
        w.str_field(self.kind.as_token());
        w.u64_field(self.timestamp_ms);
        w.field(&self.message_id.to_le_bytes());
        w.field(&self.payload);
        w.finish()
    }

    /// Try each of `allowed_keys` in order; succeed on the first key whose
    /// Ed25519 signature validates (§4.5 step 2).
    pub fn verify_signature(&self, allowed_keys: &[[u8; 32]]) -> ControlResult<()> {
        let bytes = self.canonical_bytes();
        for key in allowed_keys {
            if mesh_crypto::identity::verify(key, &bytes, &self.signature).is_ok() {
                return Ok(());
            }
        }
        Err(ControlError::InvalidSignature)
    }

    /// Absolute difference between `self.timestamp_ms` and `now_ms`.
    pub fn clock_skew_ms(&self, now_ms: u64) -> u64 {
        now_ms.abs_diff(self.timestamp_ms)
    }
}

/// Everything verification needs about the remote peer, obtained via a C3
/// reverse lookup (§4.5).
#[derive(Clone, Debug)]
pub struct PeerContext {
    /// The peer's stable identifier.
    pub peer_id: PeerId,
    /// The address this connection was observed on.
    pub remote_endpoint: String,
    /// Which transport kind this connection arrived over.
    pub transport: TransportKind,
    /// Signing keys this peer is currently allowed to use, including
    /// unexpired previous keys within the rotation overlap window.
    pub allowed_control_signing_keys: Vec<[u8; 32]>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_crypto::identity::IdentityStore;

    fn fresh_identity() -> IdentityStore {
        let dir = tempfile::tempdir().unwrap();
        IdentityStore::load_or_create(dir.path().join("id.key"), false).unwrap()
    }

    #[test]
    fn token_round_trips_for_every_known_type() {
        for kind in [
            EnvelopeType::Hello,
            EnvelopeType::ReqDelta,
            EnvelopeType::PushDelta,
            EnvelopeType::Ack,
            EnvelopeType::ReqKey,
            EnvelopeType::RespKey,
            EnvelopeType::ReqChunk,
            EnvelopeType::RespChunk,
        ] {
            assert_eq!(EnvelopeType::from_token(kind.as_token()).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_token_is_rejected() {
        assert!(EnvelopeType::from_token("BOGUS").is_err());
    }

    #[test]
    fn signed_envelope_verifies_with_the_signing_key() {
        let identity = fresh_identity();
        let envelope = ControlEnvelope::new_signed(
            EnvelopeType::Hello,
            1000,
            b"payload".to_vec(),
            None,
            |data| identity.sign(data),
        );
        assert!(envelope
            .verify_signature(&[identity.public_key()])
            .is_ok());
    }

    #[test]
    fn tampered_payload_breaks_verification() {
        let identity = fresh_identity();
        let mut envelope = ControlEnvelope::new_signed(
            EnvelopeType::Hello,
            1000,
            b"payload".to_vec(),
            None,
            |data| identity.sign(data),
        );
        envelope.payload = b"tampered".to_vec();
        assert!(envelope
            .verify_signature(&[identity.public_key()])
            .is_err());
    }

    #[test]
    fn verification_tries_every_allowed_key_until_one_matches() {
        let identity = fresh_identity();
        let other = fresh_identity();
        let envelope = ControlEnvelope::new_signed(
            EnvelopeType::Ack,
            1000,
            vec![],
            None,
            |data| identity.sign(data),
        );
        assert!(envelope
            .verify_signature(&[other.public_key(), identity.public_key()])
            .is_ok());
    }

    #[test]
    fn clock_skew_is_symmetric() {
        let identity = fresh_identity();
        let envelope = ControlEnvelope::new_signed(
            EnvelopeType::Ack,
            1_000_000,
            vec![],
            None,
            |data| identity.sign(data),
        );
        assert_eq!(envelope.clock_skew_ms(1_000_500), 500);
        assert_eq!(envelope.clock_skew_ms(999_500), 500);
    }

    #[test]
    fn message_ids_are_not_trivially_repeated() {
        let identity = fresh_identity();
        let a = ControlEnvelope::new_signed(EnvelopeType::Ack, 0, vec![], None, |d| {
            identity.sign(d)
        });
        let b = ControlEnvelope::new_signed(EnvelopeType::Ack, 0, vec![], None, |d| {
            identity.sign(d)
        });
        assert_ne!(a.message_id, b.message_id);
    }
}
