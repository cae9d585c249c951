// Copyright (c) 2024 Mesh Overlay Contributors

//! The per-connection state machine (§4.4): `Dialing → TlsHandshake → Pinned
//! → AwaitingHello → Verified → Active → Closing → Closed`. An explicit enum
//! with a checked `transition`, not a dynamically dispatched event bus.

use crate::error::TransportError;

/// A connection's current lifecycle stage.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ConnectionState {
    /// Dial in flight, no bytes exchanged yet.
    Dialing,
    /// TCP/UDP-level connection established, TLS handshake running.
    TlsHandshake,
    /// TLS handshake complete and the presented SPKI has been pinned/verified.
    Pinned,
    /// Waiting for a verified HELLO envelope from the remote peer.
    AwaitingHello,
    /// HELLO verified; peer identity and allowed signing keys are known.
    Verified,
    /// Normal operation; envelopes are exchanged.
    Active,
    /// Graceful shutdown in progress.
    Closing,
    /// Terminal; no further transitions are valid.
    Closed,
}

impl ConnectionState {
    fn allowed_next(self) -> &'static [ConnectionState] {
        use ConnectionState::*;
        match self {
            Dialing => &[TlsHandshake, Closing],
            TlsHandshake => &[Pinned, Closing],
            Pinned => &[AwaitingHello, Closing],
            AwaitingHello => &[Verified, Closing],
            Verified => &[Active, Closing],
            Active => &[Closing],
            Closing => &[Closed],
            Closed => &[],
        }
    }

    /// Attempt to move from `self` to `next`, returning the new state on
    /// success or an error naming the rejected edge.
    pub fn transition(self, next: ConnectionState) -> Result<ConnectionState, TransportError> {
        if self.allowed_next().contains(&next) {
            Ok(next)
        } else {
            Err(TransportError::InvalidTransition {
                from: format!("{self:?}"),
                to: format!("{next:?}"),
            })
        }
    }

    /// Whether envelopes may be exchanged in this state. Only `Active`
    /// connections accept `REQCHUNK` and similar application traffic.
    pub fn is_active(self) -> bool {
        matches!(self, ConnectionState::Active)
    }

    /// Whether this state is terminal.
    pub fn is_closed(self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}
