// Copyright (c) 2024 Mesh Overlay Contributors

//! Errors raised while dialing, listening, throttling, or transitioning a
//! connection's state machine.

use displaydoc::Display;
use thiserror::Error;

/// Errors produced by [`crate::quic`], [`crate::socks`], [`crate::state`],
/// and [`crate::throttle`].
#[derive(Debug, Display, Error)]
pub enum TransportError {
    /// dialing {0} timed out
    DialTimeout(String),

    /// TLS handshake with {0} timed out
    TlsHandshakeTimeout(String),

    /// HELLO exchange with {0} timed out
    HelloTimeout(String),

    /// payload of {actual} bytes exceeds the {max}-byte cap
    PayloadTooLarge {
        /// Observed payload length.
        actual: usize,
        /// Configured cap.
        max: usize,
    },

    /// presented SPKI for {endpoint} does not match the recorded pin
    PinRejected(String),

    /// anonymizing transport rejected non-{expected_suffix} host {host}
    NonAnonymizingHost {
        /// The offending host.
        host: String,
        /// The suffix the transport kind requires (`.onion`, `.i2p`).
        expected_suffix: &'static str,
    },

    /// SOCKS5 negotiation with the local proxy failed: {0}
    SocksFailure(String),

    /// invalid connection state transition from {from} to {to}
    InvalidTransition {
        /// Originating state's debug name.
        from: String,
        /// Target state's debug name.
        to: String,
    },

    /// rate limit exceeded for {0}
    RateLimited(String),

    /// no advertised endpoint is reachable and valid right now
    NoReachableEndpoint,

    /// I/O error: {0}
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

impl From<TransportError> for mesh_common::MeshError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::PayloadTooLarge { .. }
            | TransportError::NonAnonymizingHost { .. }
            | TransportError::InvalidTransition { .. } => {
                mesh_common::MeshError::protocol_violation(err.to_string())
            }
            TransportError::PinRejected(_) | TransportError::RateLimited(_) => {
                mesh_common::MeshError::policy_rejection(err.to_string())
            }
            TransportError::DialTimeout(_)
            | TransportError::TlsHandshakeTimeout(_)
            | TransportError::HelloTimeout(_)
            | TransportError::NoReachableEndpoint => {
                mesh_common::MeshError::temporary_failure(err.to_string())
            }
            TransportError::SocksFailure(_) | TransportError::Io(_) => {
                mesh_common::MeshError::transport_error(err.to_string())
            }
        }
    }
}

/// Convenience alias for `Result<T, TransportError>`.
pub type TransportResult<T> = Result<T, TransportError>;
