// Copyright (c) 2024 Mesh Overlay Contributors

//! The control-signing subordinate-key ring (§3, §4.5): a node's control
//! envelopes may be signed by a key distinct from (and rotatable
//! independently of) the stable identity key. Up to three keys are kept
//! live at once: the active key plus up to two previous keys within their
//! rotation overlap window.

use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use std::time::{Duration, SystemTime};

/// A single entry in the signing-key ring.
#[derive(Clone)]
pub struct RingKey {
    signing_key: SigningKey,
    /// Millisecond timestamp after which this key is no longer accepted,
    /// even within an overlap window.
    pub valid_until_ms: u64,
}

/// Holds the active control-signing key plus up to two previous keys still
/// within their rotation overlap window. Never holds more than three keys,
/// matching the descriptor invariant `ControlSigningPublicKeys: 1..3`.
pub struct SigningKeyRing {
    active: RingKey,
    previous: Vec<RingKey>,
}

impl SigningKeyRing {
    /// Start a fresh ring with a freshly generated active key, valid for
    /// `validity` from now.
    pub fn new(validity: Duration) -> Self {
        let mut rng = rand::rngs::OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        Self {
            active: RingKey {
                signing_key,
                valid_until_ms: now_ms() + validity.as_millis() as u64,
            },
            previous: Vec::new(),
        }
    }

    /// Rotate: the current active key becomes `previous` (capped at 2 most
    /// recent), and a freshly generated key becomes active.
    pub fn rotate(&mut self, overlap: Duration, new_validity: Duration) {
        let mut rng = rand::rngs::OsRng;
        let new_active = SigningKey::generate(&mut rng);

        let retiring = RingKey {
            signing_key: self.active.signing_key.clone(),
            valid_until_ms: now_ms() + overlap.as_millis() as u64,
        };
        self.previous.insert(0, retiring);
        self.previous.truncate(2);

        self.active = RingKey {
            signing_key: new_active,
            valid_until_ms: now_ms() + new_validity.as_millis() as u64,
        };
    }

    /// Sign with the active key.
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.active.signing_key.sign(data).to_bytes()
    }

    /// All currently unexpired public keys (active first), matching the
    /// descriptor's `ControlSigningPublicKeys` field (§3).
    pub fn unexpired_public_keys(&self) -> Vec<VerifyingKey> {
        let now = now_ms();
        std::iter::once(&self.active)
            .chain(self.previous.iter())
            .filter(|k| k.valid_until_ms > now)
            .map(|k| k.signing_key.verifying_key())
            .collect()
    }

    /// The active public key.
    pub fn active_public_key(&self) -> VerifyingKey {
        self.active.signing_key.verifying_key()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
