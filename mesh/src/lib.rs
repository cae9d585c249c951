// Copyright (c) 2024 Mesh Overlay Contributors

#![warn(missing_docs)]

//! Node facade: wires identity, certs, directory, transport, control,
//! gossip, and neighbor management into one running mesh overlay node.
//!
//! [`node::MeshNode`] owns the control-plane QUIC endpoint and the event
//! loop; [`node::NodeHandle`] is the cheap, cloneable handle callers use to
//! drive a sync cycle or a consensus lookup on demand. Everything below
//! `node` is the machinery that loop is built from: per-envelope payload
//! schemas ([`payloads`]), wire framing ([`codec`]), shared state
//! ([`state`]), the symmetric per-envelope responder ([`dispatch`]), the
//! generic receive/dispatch/respond loop ([`session`]), the asymmetric
//! active-side delta-sync driver ([`sync`]), and the k-of-n consensus
//! lookup driver ([`lookup`]).

pub mod codec;
pub mod dispatch;
pub mod lookup;
pub mod node;
pub mod payloads;
pub mod session;
pub mod state;
pub mod sync;
pub mod time;

pub use lookup::{lookup_hash, StreamDialer};
pub use node::{MeshNode, NodeCommand, NodeHandle, QuicStreamDialer};
pub use session::run_passive_session;
pub use state::NodeState;
pub use sync::drive_sync_cycle;
