// Copyright (c) 2024 Mesh Overlay Contributors

//! Exported counters (§7): envelopes rejected, signatures failed, pins
//! mismatched, quarantines active, chunks served. Generalized from a
//! per-RPC-method Prometheus collector into one process-wide collector with
//! a `reason`/`component` label, registered once and shared via `Arc` by
//! every mesh crate that needs to bump a counter.

use prometheus::{
    core::{Collector, Desc},
    proto::MetricFamily,
    IntCounterVec, IntGauge, Opts, Registry,
};

/// Process-wide counters for the mesh overlay, as named in §7.
#[derive(Clone)]
pub struct MeshMetrics {
    envelopes_rejected: IntCounterVec,
    signatures_failed: IntCounterVec,
    pins_mismatched: IntCounterVec,
    quarantines_active: IntGauge,
    chunks_served: IntCounterVec,
}

impl MeshMetrics {
    /// Build the metric family set. Call [`register`](Self::register) to
    /// attach it to a [`Registry`].
    pub fn new() -> Self {
        Self {
            envelopes_rejected: IntCounterVec::new(
                Opts::new(
                    "mesh_envelopes_rejected_total",
                    "Control envelopes rejected, by reason",
                ),
                &["reason"],
            )
            .expect("static metric descriptor"),
            signatures_failed: IntCounterVec::new(
                Opts::new(
                    "mesh_signatures_failed_total",
                    "Signature verifications that failed, by component",
                ),
                &["component"],
            )
            .expect("static metric descriptor"),
            pins_mismatched: IntCounterVec::new(
                Opts::new(
                    "mesh_pins_mismatched_total",
                    "SPKI pin mismatches observed, by plane",
                ),
                &["plane"],
            )
            .expect("static metric descriptor"),
            quarantines_active: IntGauge::new(
                "mesh_quarantines_active",
                "Peers currently under quarantine",
            )
            .expect("static metric descriptor"),
            chunks_served: IntCounterVec::new(
                Opts::new("mesh_chunks_served_total", "REQCHUNK requests served, by outcome"),
                &["outcome"],
            )
            .expect("static metric descriptor"),
        }
    }

    /// Register this collector with the given registry.
    pub fn register(&self, registry: &Registry) -> prometheus::Result<()> {
        registry.register(Box::new(self.clone()))
    }

    /// Bump the rejected-envelope counter for the given reason
    /// (`protocol_violation`, `policy_rejection`, ...).
    pub fn envelope_rejected(&self, reason: &str) {
        self.envelopes_rejected.with_label_values(&[reason]).inc();
    }

    /// Bump the failed-signature counter for the given component.
    pub fn signature_failed(&self, component: &str) {
        self.signatures_failed.with_label_values(&[component]).inc();
    }

    /// Bump the pin-mismatch counter for the given plane (`control`/`data`).
    pub fn pin_mismatched(&self, plane: &str) {
        self.pins_mismatched.with_label_values(&[plane]).inc();
    }

    /// Set the number of currently-quarantined peers.
    pub fn set_quarantines_active(&self, count: i64) {
        self.quarantines_active.set(count);
    }

    /// Bump the chunk-served counter for the given outcome (`ok`/`denied`).
    pub fn chunk_served(&self, outcome: &str) {
        self.chunks_served.with_label_values(&[outcome]).inc();
    }
}

impl Default for MeshMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MeshMetrics {
    fn desc(&self) -> Vec<&Desc> {
        let mut descs = Vec::new();
        descs.extend(self.envelopes_rejected.desc());
        descs.extend(self.signatures_failed.desc());
        descs.extend(self.pins_mismatched.desc());
        descs.extend(self.quarantines_active.desc());
        descs.extend(self.chunks_served.desc());
        descs
    }

    fn collect(&self) -> Vec<MetricFamily> {
        let mut families = Vec::new();
        families.extend(self.envelopes_rejected.collect());
        families.extend(self.signatures_failed.collect());
        families.extend(self.pins_mismatched.collect());
        families.extend(self.quarantines_active.collect());
        families.extend(self.chunks_served.collect());
        families
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let metrics = MeshMetrics::new();
        let families = metrics.collect();
        for family in families {
            for m in family.get_metric() {
                if m.has_counter() {
                    assert_eq!(m.get_counter().get_value(), 0.0);
                }
            }
        }
    }

    #[test]
    fn envelope_rejected_increments_labeled_counter() {
        let metrics = MeshMetrics::new();
        metrics.envelope_rejected("protocol_violation");
        metrics.envelope_rejected("protocol_violation");
        metrics.envelope_rejected("policy_rejection");
        let value = metrics
            .envelopes_rejected
            .with_label_values(&["protocol_violation"])
            .get();
        assert_eq!(value, 2);
    }

    #[test]
    fn quarantine_gauge_reflects_last_set_value() {
        let metrics = MeshMetrics::new();
        metrics.set_quarantines_active(3);
        assert_eq!(metrics.quarantines_active.get(), 3);
        metrics.set_quarantines_active(0);
        assert_eq!(metrics.quarantines_active.get(), 0);
    }

    #[test]
    fn can_register_into_a_fresh_registry() {
        let registry = Registry::new();
        let metrics = MeshMetrics::new();
        metrics.register(&registry).unwrap();
        assert!(!registry.gather().is_empty());
    }
}
