// Copyright (c) 2024 Mesh Overlay Contributors

//! The [`Pin`] record and its enums, per §3.

use serde::{Deserialize, Serialize};

/// Which TLS plane a pin applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Plane {
    /// The control-plane QUIC listener.
    Control,
    /// The data-plane QUIC listener.
    Data,
}

/// How a pin was learned.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum PinSource {
    /// Learned from a verified peer descriptor.
    Descriptor,
    /// Learned by trusting the first observed certificate (TOFU).
    Tofu,
}

/// A recorded SPKI pin authorizing a TLS endpoint for a given peer/plane.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pin {
    /// The endpoint this pin applies to, as `host:port`.
    pub endpoint: String,
    /// Which plane this pin guards.
    pub plane: Plane,
    /// The current SPKI SHA-256, hex-encoded.
    pub spki_sha256: String,
    /// When this pin was learned, in milliseconds since the epoch.
    pub learned_at_ms: u64,
    /// How this pin was learned.
    pub source: PinSource,
    /// The previous SPKI SHA-256, if a rotation is in its overlap window.
    pub previous_spki_sha256: Option<String>,
    /// When the previous SPKI stops being accepted.
    pub previous_expires_at_ms: Option<u64>,
}

impl Pin {
    /// Whether `spki_sha256` satisfies this pin: an exact match against the
    /// current hash, or against the previous hash while still within its
    /// overlap window relative to `now_ms`.
    pub fn accepts(&self, spki_sha256: &str, now_ms: u64) -> bool {
        if self.spki_sha256 == spki_sha256 {
            return true;
        }
        if let (Some(prev), Some(expires)) =
            (&self.previous_spki_sha256, self.previous_expires_at_ms)
        {
            return prev == spki_sha256 && now_ms <= expires;
        }
        false
    }
}
