// Copyright (c) 2024 Mesh Overlay Contributors

//! The five-way error taxonomy of §7: every fallible operation in the mesh
//! crates ultimately maps into one of these categories so the dispatcher can
//! attribute counters and propagation behavior without downstream crates
//! depending on each other's concrete error types.

use displaydoc::Display;
use thiserror::Error;

/// Top-level error taxonomy shared across the mesh overlay.
///
/// Leaf crates define their own `thiserror` enums and convert into this one
/// at the point where they cross into dispatch (`mesh-control`/`mesh-gossip`).
#[derive(Debug, Display, Error)]
pub enum MeshError {
    /// protocol violation: {0}
    ProtocolViolation(String),

    /// policy rejection: {0}
    PolicyRejection(String),

    /// transport error: {0}
    TransportError(String),

    /// temporary failure: {0}
    TemporaryFailure(String),

    /// configuration error: {0}
    ConfigurationError(String),
}

impl MeshError {
    /// Malformed envelope, bad signature, unknown `Type`, size overflow.
    /// Surfaced to reputation; dropped silently on the wire.
    pub fn protocol_violation(msg: impl Into<String>) -> Self {
        Self::ProtocolViolation(msg.into())
    }

    /// Rate limit, quarantine, unknown-realm message. Dropped silently.
    pub fn policy_rejection(msg: impl Into<String>) -> Self {
        Self::PolicyRejection(msg.into())
    }

    /// TLS handshake failure, SOCKS refusal, DNS-leak guard trip.
    pub fn transport_error(msg: impl Into<String>) -> Self {
        Self::TransportError(msg.into())
    }

    /// Timeout, cancellation, bounded-queue full. Retryable by caller.
    pub fn temporary_failure(msg: impl Into<String>) -> Self {
        Self::TemporaryFailure(msg.into())
    }

    /// Missing required endpoint binding, mutually exclusive options. Fatal
    /// at startup.
    pub fn configuration_error(msg: impl Into<String>) -> Self {
        Self::ConfigurationError(msg.into())
    }

    /// Whether this error should be retried by the caller (`TemporaryFailure`
    /// only).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TemporaryFailure(_))
    }

    /// Whether processing should continue to silently drop the triggering
    /// message without any response to the peer (protocol violations and
    /// policy rejections never produce a distinguishable reply, to deny
    /// oracle attacks).
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::ProtocolViolation(_) | Self::PolicyRejection(_))
    }
}

/// Convenience alias for `Result<T, MeshError>`.
pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_exactly_one_category() {
        let variants = [
            MeshError::protocol_violation("x"),
            MeshError::policy_rejection("x"),
            MeshError::transport_error("x"),
            MeshError::temporary_failure("x"),
            MeshError::configuration_error("x"),
        ];
        for v in &variants {
            let retryable = v.is_retryable();
            let silent = v.is_silent();
            // A variant is never both retryable and silent.
            assert!(!(retryable && silent));
        }
    }

    #[test]
    fn only_temporary_failure_is_retryable() {
        assert!(MeshError::temporary_failure("t").is_retryable());
        assert!(!MeshError::protocol_violation("p").is_retryable());
        assert!(!MeshError::policy_rejection("p").is_retryable());
        assert!(!MeshError::transport_error("t").is_retryable());
        assert!(!MeshError::configuration_error("c").is_retryable());
    }

    #[test]
    fn protocol_and_policy_are_silent() {
        assert!(MeshError::protocol_violation("p").is_silent());
        assert!(MeshError::policy_rejection("p").is_silent());
        assert!(!MeshError::transport_error("t").is_silent());
    }

    #[test]
    fn display_includes_message() {
        let err = MeshError::transport_error("handshake failed");
        assert!(err.to_string().contains("handshake failed"));
    }
}
