// Copyright (c) 2024 Mesh Overlay Contributors

//! [`PeerDescriptor`] (§3): the signed record a node publishes to the DHT
//! describing how it can be reached.

use mesh_common::canonical::CanonicalWriter;
use mesh_common::PeerId;
use serde::{Deserialize, Serialize};

/// Which transport kind an endpoint is reachable over.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum TransportKind {
    /// Direct QUIC, no anonymity network.
    DirectQuic,
    /// QUIC dialed through a Tor SOCKS5 proxy to a `.onion` address.
    TorOnionQuic,
    /// QUIC dialed through an I2P SOCKS5 proxy to a `.i2p` address.
    I2pQuic,
}

impl TransportKind {
    fn canonical_tag(self) -> &'static str {
        match self {
            TransportKind::DirectQuic => "direct-quic",
            TransportKind::TorOnionQuic => "tor-onion-quic",
            TransportKind::I2pQuic => "i2p-quic",
        }
    }

    /// Whether this transport kind routes over an anonymity network,
    /// triggering the DNS-leak guard and stream isolation requirements
    /// (§4.4).
    pub fn is_anonymizing(self) -> bool {
        matches!(self, TransportKind::TorOnionQuic | TransportKind::I2pQuic)
    }

    /// Whether `host` satisfies this transport kind's domain-suffix policy
    /// (§3 invariant): `.onion` for Tor, `.i2p` for I2P; direct-quic accepts
    /// IP literals or policy-allowed DNS names (policy enforcement itself
    /// lives with the embedder; here we only reject the anonymizing-kind
    /// mismatches that are unconditionally invalid).
    pub fn host_satisfies_policy(self, host: &str) -> bool {
        match self {
            TransportKind::TorOnionQuic => host.ends_with(".onion"),
            TransportKind::I2pQuic => host.ends_with(".i2p"),
            TransportKind::DirectQuic => true,
        }
    }
}

/// Which plane(s) an endpoint serves.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Scope {
    /// Control-plane only.
    Control,
    /// Data-plane only.
    Data,
    /// Both control and data planes.
    ControlAndData,
}

/// NAT classification advertised by a node.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum NatType {
    /// NAT type not determined.
    Unknown,
    /// No NAT; directly reachable.
    Direct,
    /// Restricted-cone or port-restricted NAT.
    Restricted,
    /// Symmetric NAT; direct reachability unlikely.
    Symmetric,
}

/// One advertised transport endpoint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Which transport this endpoint is reachable over.
    pub transport_kind: TransportKind,
    /// Hostname, IP literal, `.onion`, or `.i2p` address.
    pub host: String,
    /// Port number.
    pub port: u16,
    /// Which plane(s) this endpoint serves.
    pub scope: Scope,
    /// Lower is preferred (§4.4 selection order).
    pub preference: i32,
    /// Lower is cheaper (§4.4 selection order, tiebreak after preference).
    pub cost: i32,
    /// Endpoint not valid before this time, if set.
    pub valid_from_ms: Option<u64>,
    /// Endpoint not valid after this time, if set.
    pub valid_to_ms: Option<u64>,
}

impl Endpoint {
    /// Whether `now_ms` falls within `[valid_from, valid_to]` (open bounds
    /// where unset).
    pub fn is_valid_at(&self, now_ms: u64) -> bool {
        if let Some(from) = self.valid_from_ms {
            if now_ms < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to_ms {
            if now_ms > to {
                return false;
            }
        }
        true
    }

    fn canonical_sort_key(&self) -> (TransportKind, String, u16) {
        (self.transport_kind, self.host.clone(), self.port)
    }
}

/// The signed peer descriptor published to the DHT (§3).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Canonical hex `PeerId`.
    pub peer_id: PeerId,
    /// Advertised endpoints, in publish order (canonicalization re-sorts
    /// them; this field preserves whatever order the publisher chose).
    pub endpoints: Vec<Endpoint>,
    /// NAT classification.
    pub nat_type: NatType,
    /// Whether this node requires relaying to be reached.
    pub relay_required: bool,
    /// When this descriptor was created/refreshed.
    pub timestamp_ms: u64,
    /// The node's 32-byte Ed25519 identity public key.
    pub identity_public_key: [u8; 32],
    /// SPKI SHA-256 of the control-plane TLS certificate.
    pub tls_control_spki_sha256: [u8; 32],
    /// SPKI SHA-256 of the data-plane TLS certificate.
    pub tls_data_spki_sha256: [u8; 32],
    /// 1..3 Ed25519 control-signing public keys (active + up to 2 previous).
    pub control_signing_public_keys: Vec<[u8; 32]>,
    /// 64-byte Ed25519 signature over the canonicalization of every other
    /// field.
    pub signature: [u8; 64],
}

impl PeerDescriptor {
    /// Canonicalize all fields except `signature`, with endpoints sorted by
    /// `(TransportKind, Host, Port)` lexicographically (§4.3).
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut endpoints = self.endpoints.clone();
        endpoints.sort_by_key(Endpoint::canonical_sort_key);

        let mut w = CanonicalWriter::new();
        w.str_field(self.peer_id.as_str());
        w.u64_field(endpoints.len() as u64);
        for ep in &endpoints {
            w.str_field(ep.transport_kind.canonical_tag());
            w.str_field(&ep.host);
            w.field(&ep.port.to_le_bytes());
            w.u8_field(match ep.scope {
                Scope::Control => 0,
                Scope::Data => 1,
                Scope::ControlAndData => 2,
            });
            w.field(&ep.preference.to_le_bytes());
            w.field(&ep.cost.to_le_bytes());
            w.u64_field(ep.valid_from_ms.unwrap_or(0));
            w.u64_field(ep.valid_to_ms.unwrap_or(0));
        }
        w.u8_field(match self.nat_type {
            NatType::Unknown => 0,
            NatType::Direct => 1,
            NatType::Restricted => 2,
            NatType::Symmetric => 3,
        });
        w.u8_field(self.relay_required as u8);
        w.u64_field(self.timestamp_ms);
        w.field(&self.identity_public_key);
        w.field(&self.tls_control_spki_sha256);
        w.field(&self.tls_data_spki_sha256);
        w.u64_field(self.control_signing_public_keys.len() as u64);
        for key in &self.control_signing_public_keys {
            w.field(key);
        }
        w.finish()
    }

    /// Sign this descriptor's canonical bytes with `sign_fn` (typically
    /// `IdentityStore::sign`), filling in `signature`.
    pub fn sign_with(&mut self, sign_fn: impl FnOnce(&[u8]) -> [u8; 64]) {
        self.signature = sign_fn(&self.signing_bytes());
    }

    /// Verify `PeerId == hex(SHA256(identity_public_key))` and that
    /// `signature` validates over `signing_bytes()` (§8 properties 2, 3).
    pub fn verify(&self) -> crate::error::DirectoryResult<()> {
        if !self.peer_id.matches_public_key(&self.identity_public_key) {
            return Err(crate::error::DirectoryError::PeerIdMismatch {
                claimed: self.peer_id.to_string(),
                derived: PeerId::from_public_key(&self.identity_public_key).to_string(),
            });
        }
        mesh_crypto::identity::verify(
            &self.identity_public_key,
            &self.signing_bytes(),
            &self.signature,
        )
        .map_err(|_| crate::error::DirectoryError::InvalidSignature)?;
        if self.control_signing_public_keys.is_empty() {
            return Err(crate::error::DirectoryError::NoUnexpiredSigningKeys);
        }
        for ep in &self.endpoints {
            if !ep.transport_kind.host_satisfies_policy(&ep.host) {
                return Err(crate::error::DirectoryError::InvalidEndpointHost(
                    ep.host.clone(),
                ));
            }
        }
        Ok(())
    }

    /// Whether `self` is newer than `other` by `timestamp_ms`.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.timestamp_ms > other.timestamp_ms
    }
}
