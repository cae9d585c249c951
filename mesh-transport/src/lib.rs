// Copyright (c) 2024 Mesh Overlay Contributors

//! TransportLayer (C4): QUIC connections (direct, Tor-onion, I2P) with
//! handshake/envelope throttling, payload caps, and pin-checked TLS.

#![warn(missing_docs)]

pub mod error;
pub mod quic;
pub mod socks;
pub mod state;
pub mod throttle;

pub use error::{TransportError, TransportResult};
pub use quic::{enforce_payload_cap, QuicEndpoint, MAX_ENVELOPE_PAYLOAD_BYTES, MAX_REMOTE_BLOB_BYTES};
pub use state::ConnectionState;
pub use throttle::{Throttle, ThrottleLimits};
