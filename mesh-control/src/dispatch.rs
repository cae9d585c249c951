// Copyright (c) 2024 Mesh Overlay Contributors

//! Verification pipeline and dispatch (§4.5): replay/time check, signature
//! check, then a static match over `Type` routing to the upper layer. No
//! dynamic handler registry — adding a new `Type` means adding a match arm
//! and a trait method, both visible at compile time.

use crate::envelope::{ControlEnvelope, EnvelopeType, PeerContext};
use crate::error::{ControlError, ControlResult};
use crate::replay::ReplayCache;

/// Verify `envelope` against `ctx` in the order §4.5 specifies: replay/time,
/// then signature. Type-specific payload validation is the caller's
/// responsibility once this returns `Ok`.
pub fn verify_envelope(
    envelope: &ControlEnvelope,
    ctx: &PeerContext,
    replay: &mut ReplayCache,
    now_ms: u64,
    max_clock_skew_ms: u64,
) -> ControlResult<()> {
    let skew = envelope.clock_skew_ms(now_ms);
    if skew > max_clock_skew_ms {
        return Err(ControlError::ClockSkew {
            skew_ms: skew,
            max_skew_ms: max_clock_skew_ms,
        });
    }

    replay.check_and_record(
        &ctx.peer_id,
        envelope.message_id,
        envelope.timestamp_ms,
        now_ms,
    )?;

    envelope.verify_signature(&ctx.allowed_control_signing_keys)?;

    Ok(())
}

/// One method per known [`EnvelopeType`], implemented by the gossip layer.
/// `dispatch` below performs the match; this trait only supplies the
/// per-type behavior.
pub trait EnvelopeHandlers {
    /// Handle a `HELLO` envelope.
    fn on_hello(&self, payload: &[u8], ctx: &PeerContext) -> ControlResult<Option<Vec<u8>>>;
    /// Handle a `REQDELTA` envelope.
    fn on_req_delta(&self, payload: &[u8], ctx: &PeerContext) -> ControlResult<Option<Vec<u8>>>;
    /// Handle a `PUSHDELTA` envelope.
    fn on_push_delta(&self, payload: &[u8], ctx: &PeerContext) -> ControlResult<Option<Vec<u8>>>;
    /// Handle an `ACK` envelope.
    fn on_ack(&self, payload: &[u8], ctx: &PeerContext) -> ControlResult<Option<Vec<u8>>>;
    /// Handle a `REQKEY` envelope.
    fn on_req_key(&self, payload: &[u8], ctx: &PeerContext) -> ControlResult<Option<Vec<u8>>>;
    /// Handle a `RESPKEY` envelope.
    fn on_resp_key(&self, payload: &[u8], ctx: &PeerContext) -> ControlResult<Option<Vec<u8>>>;
    /// Handle a `REQCHUNK` envelope. Only ever called on `Active` connections
    /// (i.e. past a verified HELLO); see the Open Question on pre-HELLO
    /// `REQCHUNK` for why there is no other case to handle here.
    fn on_req_chunk(&self, payload: &[u8], ctx: &PeerContext) -> ControlResult<Option<Vec<u8>>>;
    /// Handle a `RESPCHUNK` envelope.
    fn on_resp_chunk(&self, payload: &[u8], ctx: &PeerContext) -> ControlResult<Option<Vec<u8>>>;
}

/// Route a verified envelope to the matching handler method.
pub fn dispatch(
    envelope: &ControlEnvelope,
    ctx: &PeerContext,
    handlers: &dyn EnvelopeHandlers,
) -> ControlResult<Option<Vec<u8>>> {
    match envelope.kind {
        EnvelopeType::Hello => handlers.on_hello(&envelope.payload, ctx),
        EnvelopeType::ReqDelta => handlers.on_req_delta(&envelope.payload, ctx),
        EnvelopeType::PushDelta => handlers.on_push_delta(&envelope.payload, ctx),
        EnvelopeType::Ack => handlers.on_ack(&envelope.payload, ctx),
        EnvelopeType::ReqKey => handlers.on_req_key(&envelope.payload, ctx),
        EnvelopeType::RespKey => handlers.on_resp_key(&envelope.payload, ctx),
        EnvelopeType::ReqChunk => handlers.on_req_chunk(&envelope.payload, ctx),
        EnvelopeType::RespChunk => handlers.on_resp_chunk(&envelope.payload, ctx),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ControlEnvelope;
    use mesh_common::PeerId;
    use mesh_crypto::identity::IdentityStore;
    use mesh_directory::TransportKind;

    fn fresh_identity() -> IdentityStore {
        let dir = tempfile::tempdir().unwrap();
        IdentityStore::load_or_create(dir.path().join("id.key"), false).unwrap()
    }

    fn ctx(peer_id: PeerId, key: [u8; 32]) -> PeerContext {
        PeerContext {
            peer_id,
            remote_endpoint: "198.51.100.7:4433".into(),
            transport: TransportKind::DirectQuic,
            allowed_control_signing_keys: vec![key],
        }
    }

    struct RecordingHandlers {
        last_called: std::cell::RefCell<Option<&'static str>>,
    }

    impl EnvelopeHandlers for RecordingHandlers {
        fn on_hello(&self, _: &[u8], _: &PeerContext) -> ControlResult<Option<Vec<u8>>> {
            *self.last_called.borrow_mut() = Some("hello");
            Ok(None)
        }
        fn on_req_delta(&self, _: &[u8], _: &PeerContext) -> ControlResult<Option<Vec<u8>>> {
            *self.last_called.borrow_mut() = Some("req_delta");
            Ok(None)
        }
        fn on_push_delta(&self, _: &[u8], _: &PeerContext) -> ControlResult<Option<Vec<u8>>> {
            *self.last_called.borrow_mut() = Some("push_delta");
            Ok(None)
        }
        fn on_ack(&self, _: &[u8], _: &PeerContext) -> ControlResult<Option<Vec<u8>>> {
            *self.last_called.borrow_mut() = Some("ack");
            Ok(None)
        }
        fn on_req_key(&self, _: &[u8], _: &PeerContext) -> ControlResult<Option<Vec<u8>>> {
            *self.last_called.borrow_mut() = Some("req_key");
            Ok(None)
        }
        fn on_resp_key(&self, _: &[u8], _: &PeerContext) -> ControlResult<Option<Vec<u8>>> {
            *self.last_called.borrow_mut() = Some("resp_key");
            Ok(None)
        }
        fn on_req_chunk(&self, _: &[u8], _: &PeerContext) -> ControlResult<Option<Vec<u8>>> {
            *self.last_called.borrow_mut() = Some("req_chunk");
            Ok(None)
        }
        fn on_resp_chunk(&self, _: &[u8], _: &PeerContext) -> ControlResult<Option<Vec<u8>>> {
            *self.last_called.borrow_mut() = Some("resp_chunk");
            Ok(None)
        }
    }

    #[test]
    fn verify_then_dispatch_happy_path() {
        let identity = fresh_identity();
        let ctx = ctx(identity.peer_id().clone(), identity.public_key());
        let envelope = ControlEnvelope::new_signed(EnvelopeType::Hello, 1000, vec![], None, |d| {
            identity.sign(d)
        });
        let mut replay = ReplayCache::new(600_000);

        verify_envelope(&envelope, &ctx, &mut replay, 1000, 120_000).unwrap();

        let handlers = RecordingHandlers {
            last_called: std::cell::RefCell::new(None),
        };
        dispatch(&envelope, &ctx, &handlers).unwrap();
        assert_eq!(*handlers.last_called.borrow(), Some("hello"));
    }

    #[test]
    fn verify_rejects_excessive_clock_skew() {
        let identity = fresh_identity();
        let ctx = ctx(identity.peer_id().clone(), identity.public_key());
        let envelope = ControlEnvelope::new_signed(EnvelopeType::Ack, 0, vec![], None, |d| {
            identity.sign(d)
        });
        let mut replay = ReplayCache::new(600_000);

        let result = verify_envelope(&envelope, &ctx, &mut replay, 10_000_000, 120_000);
        assert!(matches!(result, Err(ControlError::ClockSkew { .. })));
    }

    #[test]
    fn verify_rejects_replayed_message() {
        let identity = fresh_identity();
        let ctx = ctx(identity.peer_id().clone(), identity.public_key());
        let envelope = ControlEnvelope::new_signed(EnvelopeType::Ack, 1000, vec![], None, |d| {
            identity.sign(d)
        });
        let mut replay = ReplayCache::new(600_000);

        verify_envelope(&envelope, &ctx, &mut replay, 1000, 120_000).unwrap();
        let result = verify_envelope(&envelope, &ctx, &mut replay, 1200, 120_000);
        assert!(matches!(result, Err(ControlError::Replayed)));
    }

    #[test]
    fn verify_rejects_signature_from_unlisted_key() {
        let identity = fresh_identity();
        let other = fresh_identity();
        let ctx = ctx(identity.peer_id().clone(), other.public_key());
        let envelope = ControlEnvelope::new_signed(EnvelopeType::Ack, 1000, vec![], None, |d| {
            identity.sign(d)
        });
        let mut replay = ReplayCache::new(600_000);

        let result = verify_envelope(&envelope, &ctx, &mut replay, 1000, 120_000);
        assert!(matches!(result, Err(ControlError::InvalidSignature)));
    }

    #[test]
    fn dispatch_routes_every_type_to_its_own_handler() {
        let identity = fresh_identity();
        let ctx = ctx(identity.peer_id().clone(), identity.public_key());
        let handlers = RecordingHandlers {
            last_called: std::cell::RefCell::new(None),
        };

        for (kind, expected) in [
            (EnvelopeType::Hello, "hello"),
            (EnvelopeType::ReqDelta, "req_delta"),
            (EnvelopeType::PushDelta, "push_delta"),
            (EnvelopeType::Ack, "ack"),
            (EnvelopeType::ReqKey, "req_key"),
            (EnvelopeType::RespKey, "resp_key"),
            (EnvelopeType::ReqChunk, "req_chunk"),
            (EnvelopeType::RespChunk, "resp_chunk"),
        ] {
            let envelope =
                ControlEnvelope::new_signed(kind, 1000, vec![], None, |d| identity.sign(d));
            dispatch(&envelope, &ctx, &handlers).unwrap();
            assert_eq!(*handlers.last_called.borrow(), Some(expected));
        }
    }
}
