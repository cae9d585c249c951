// Copyright (c) 2024 Mesh Overlay Contributors

//! A single immutable configuration record consolidating every numeric knob
//! named throughout §4 (rates, windows, thresholds, timeouts), per the
//! Design Note in §9: "consolidate all numeric knobs into a single
//! immutable config record constructed at startup; mutating tests should
//! construct a new record."
//!
//! Loading this record from environment, files, or flags is explicitly out
//! of scope (§1); only its shape and defaults are specified here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transport throttling knobs (§4.4 Throttling / Payload caps).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Global inbound handshake rate, per minute. Default 1000.
    pub global_handshake_rate_per_min: u32,
    /// Per-remote-IP handshake rate, per minute. Default 10.
    pub per_ip_handshake_rate_per_min: u32,
    /// Per-transport-kind handshake rate, per minute. Default 100.
    pub per_transport_kind_rate_per_min: u32,
    /// Per-peer control envelope rate, per minute, once identified. Default 60.
    pub per_peer_envelope_rate_per_min: u32,
    /// Maximum size of a single envelope payload. Default 64 KiB.
    pub max_envelope_payload_bytes: usize,
    /// Maximum size of a single remote blob (e.g. DHT value). Default 1 MiB.
    pub max_remote_blob_bytes: usize,
    /// `Dialing -> TlsHandshake` timeout. Default 10s.
    pub dialing_timeout: Duration,
    /// `TlsHandshake -> Pinned` timeout. Default 10s.
    pub tls_handshake_timeout: Duration,
    /// `Pinned -> AwaitingHello -> Verified` timeout. Default 5s.
    pub hello_timeout: Duration,
    /// Whether strict pinning is required (descriptor-sourced pin only, no TOFU).
    pub strict_pinning: bool,
    /// Global inbound handshake concurrency semaphore size.
    pub global_handshake_concurrency: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            global_handshake_rate_per_min: 1000,
            per_ip_handshake_rate_per_min: 10,
            per_transport_kind_rate_per_min: 100,
            per_peer_envelope_rate_per_min: 60,
            max_envelope_payload_bytes: 64 * 1024,
            max_remote_blob_bytes: 1024 * 1024,
            dialing_timeout: Duration::from_secs(10),
            tls_handshake_timeout: Duration::from_secs(10),
            hello_timeout: Duration::from_secs(5),
            strict_pinning: false,
            global_handshake_concurrency: 1000,
        }
    }
}

/// Control-plane knobs (§4.5).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Maximum accepted clock skew between envelope timestamp and now. Default 2 min.
    pub max_clock_skew: Duration,
    /// Window over which `(PeerId, MessageId)` replay is checked. Default 10 min.
    pub replay_window: Duration,
    /// Envelope round-trip timeout. Default 15s.
    pub envelope_round_trip_timeout: Duration,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            max_clock_skew: Duration::from_secs(2 * 60),
            replay_window: Duration::from_secs(10 * 60),
            envelope_round_trip_timeout: Duration::from_secs(15),
        }
    }
}

/// Hash-gossip knobs (§4.6).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Maximum entries returned in a single `PUSHDELTA`. Default 1000.
    pub max_delta_entries: u32,
    /// Cooldown before resyncing the same peer. Default 30 min.
    pub sync_interval: Duration,
    /// Rolling window over which invalid-entry/invalid-message counts are tracked. Default 5 min.
    pub rate_limit_window: Duration,
    /// Max invalid entries within the window before a violation is counted. Default 50.
    pub max_invalid_entries_per_window: u32,
    /// Max invalid messages within the window before a violation is counted. Default 10.
    pub max_invalid_messages_per_window: u32,
    /// Violations within the window before quarantine. Default 3.
    pub quarantine_violation_threshold: u32,
    /// Quarantine duration. Default 30 min.
    pub quarantine_duration: Duration,
    /// Peers queried for a targeted lookup. Default 5.
    pub consensus_min_peers: u32,
    /// Agreements required to accept a consensus lookup result. Default 3.
    pub consensus_min_agreements: u32,
    /// Proof-of-possession prefix length requested via `REQCHUNK`. Default 32 KiB.
    pub pop_prefix_bytes: usize,
    /// Whether proof-of-possession is enabled.
    pub pop_enabled: bool,
    /// Maximum `FlacKey` length. Default 256.
    pub max_flac_key_len: usize,
    /// Maximum `HashEntry.Size`. Default 4 GiB-ish cap left to the embedder; the
    /// config record just carries whatever value is configured (no hardcoded
    /// default beyond "very large but bounded").
    pub max_entry_size_bytes: i64,
    /// Per-peer chunk-request cap, per minute. Default 60.
    pub chunk_request_rate_per_min: u32,
    /// Maximum bytes returned per `RESPCHUNK`. Default 32 KiB.
    pub max_chunk_length_bytes: usize,
    /// Outbound delta-sync probes per cycle. Default 5.
    pub max_peers_per_cycle: usize,
    /// Chunk workers per peer. Default 3.
    pub max_chunk_concurrency_per_peer: usize,
    /// Chunk workers globally. Default 20.
    pub max_chunk_concurrency_global: usize,
    /// Lookup consensus round timeout. Default 10s.
    pub lookup_consensus_timeout: Duration,
    /// Chunk request timeout. Default 15s.
    pub chunk_request_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            max_delta_entries: 1000,
            sync_interval: Duration::from_secs(30 * 60),
            rate_limit_window: Duration::from_secs(5 * 60),
            max_invalid_entries_per_window: 50,
            max_invalid_messages_per_window: 10,
            quarantine_violation_threshold: 3,
            quarantine_duration: Duration::from_secs(30 * 60),
            consensus_min_peers: 5,
            consensus_min_agreements: 3,
            pop_prefix_bytes: 32 * 1024,
            pop_enabled: true,
            max_flac_key_len: 256,
            max_entry_size_bytes: i64::MAX / 4,
            chunk_request_rate_per_min: 60,
            max_chunk_length_bytes: 32 * 1024,
            max_peers_per_cycle: 5,
            max_chunk_concurrency_per_peer: 3,
            max_chunk_concurrency_global: 20,
            lookup_consensus_timeout: Duration::from_secs(10),
            chunk_request_timeout: Duration::from_secs(15),
        }
    }
}

/// Neighbor-manager knobs (§4.7).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeighborConfig {
    /// Target neighbor-set size. Default 5.
    pub target_neighbors: usize,
    /// Successful interactions required for promotion. Default 3.
    pub promotion_threshold: u32,
    /// Consecutive failures before demotion. Default 3.
    pub demotion_threshold: u32,
    /// Candidate-pool cap. Default 20.
    pub candidate_cap: usize,
    /// Idle timeout before a silent neighbor is demoted. Default 24h.
    pub neighbor_idle_timeout: Duration,
    /// Interval between neighbor syncs. Default 30 min.
    pub neighbor_sync_interval: Duration,
    /// Interval between random-candidate syncs. Default 2h.
    pub random_sync_interval: Duration,
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            target_neighbors: 5,
            promotion_threshold: 3,
            demotion_threshold: 3,
            candidate_cap: 20,
            neighbor_idle_timeout: Duration::from_secs(24 * 60 * 60),
            neighbor_sync_interval: Duration::from_secs(30 * 60),
            random_sync_interval: Duration::from_secs(2 * 60 * 60),
        }
    }
}

/// Certificate/pin-store knobs (§4.2).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CertsConfig {
    /// Certificate validity period. Default 5 years (365.25 * 5 days).
    pub cert_validity: Duration,
    /// Pin-rotation overlap window during which both old and new SPKI are accepted. Default 30 days.
    pub pin_rotation_overlap: Duration,
    /// Control-signing-key rotation overlap window (§3 descriptor invariant). Default 90 days.
    pub signing_key_rotation_overlap: Duration,
}

impl Default for CertsConfig {
    fn default() -> Self {
        Self {
            cert_validity: Duration::from_secs(5 * 365 * 24 * 60 * 60),
            pin_rotation_overlap: Duration::from_secs(30 * 24 * 60 * 60),
            signing_key_rotation_overlap: Duration::from_secs(90 * 24 * 60 * 60),
        }
    }
}

/// Descriptor publish/cache knobs (§4.3).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Interval between periodic descriptor republishes. Default 15 min.
    pub republish_interval: Duration,
    /// Descriptor cache TTL. Default 5 min.
    pub descriptor_cache_ttl: Duration,
    /// Reverse-lookup (endpoint -> PeerId) entry max age.
    pub reverse_lookup_max_age: Duration,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            republish_interval: Duration::from_secs(15 * 60),
            descriptor_cache_ttl: Duration::from_secs(5 * 60),
            reverse_lookup_max_age: Duration::from_secs(60 * 60),
        }
    }
}

/// The single immutable configuration record for a mesh node, consolidating
/// every knob named in §4/§5. Construct once at startup via
/// [`MeshConfigBuilder`]; mutating scenarios build a new record rather than
/// mutating this one in place (§8 property 15).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Transport-tier knobs.
    pub transport: TransportConfig,
    /// Control-plane knobs.
    pub control: ControlConfig,
    /// Hash-gossip knobs.
    pub gossip: GossipConfig,
    /// Neighbor-manager knobs.
    pub neighbors: NeighborConfig,
    /// Certificate/pin-store knobs.
    pub certs: CertsConfig,
    /// Peer-directory knobs.
    pub directory: DirectoryConfig,
}

/// Builder for [`MeshConfig`], mirroring the teacher's builder-over-defaults
/// pattern: every field starts at its documented default and can be
/// overridden before `build()`.
#[derive(Clone, Debug, Default)]
pub struct MeshConfigBuilder {
    config: MeshConfig,
}

impl MeshConfigBuilder {
    /// Start from all-default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the transport-tier knobs.
    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.config.transport = transport;
        self
    }

    /// Override the control-plane knobs.
    pub fn control(mut self, control: ControlConfig) -> Self {
        self.config.control = control;
        self
    }

    /// Override the hash-gossip knobs.
    pub fn gossip(mut self, gossip: GossipConfig) -> Self {
        self.config.gossip = gossip;
        self
    }

    /// Override the neighbor-manager knobs.
    pub fn neighbors(mut self, neighbors: NeighborConfig) -> Self {
        self.config.neighbors = neighbors;
        self
    }

    /// Override the certificate/pin-store knobs.
    pub fn certs(mut self, certs: CertsConfig) -> Self {
        self.config.certs = certs;
        self
    }

    /// Override the descriptor publish/cache knobs.
    pub fn directory(mut self, directory: DirectoryConfig) -> Self {
        self.config.directory = directory;
        self
    }

    /// Finish building the immutable record.
    pub fn build(self) -> MeshConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_literals() {
        let cfg = MeshConfigBuilder::new().build();
        assert_eq!(cfg.gossip.max_delta_entries, 1000);
        assert_eq!(cfg.gossip.consensus_min_peers, 5);
        assert_eq!(cfg.gossip.consensus_min_agreements, 3);
        assert_eq!(cfg.gossip.quarantine_violation_threshold, 3);
        assert_eq!(cfg.neighbors.target_neighbors, 5);
        assert_eq!(cfg.neighbors.promotion_threshold, 3);
        assert_eq!(cfg.transport.per_peer_envelope_rate_per_min, 60);
    }

    #[test]
    fn builder_overrides_only_the_named_section() {
        let mut gossip = GossipConfig::default();
        gossip.consensus_min_peers = 7;
        let cfg = MeshConfigBuilder::new().gossip(gossip).build();
        assert_eq!(cfg.gossip.consensus_min_peers, 7);
        // Untouched sections keep their defaults.
        assert_eq!(cfg.neighbors.target_neighbors, 5);
    }

    #[test]
    fn building_twice_yields_independent_records() {
        let a = MeshConfigBuilder::new().build();
        let mut gossip = GossipConfig::default();
        gossip.consensus_min_peers = 99;
        let b = MeshConfigBuilder::new().gossip(gossip).build();
        assert_ne!(a, b);
        assert_eq!(a.gossip.consensus_min_peers, 5);
    }
}
