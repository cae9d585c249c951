// Copyright (c) 2024 Mesh Overlay Contributors

#![warn(missing_docs)]

//! Signed envelope model, replay defense, and static dispatch for the
//! control plane (§4.5).

pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod replay;

pub use dispatch::{dispatch, verify_envelope, EnvelopeHandlers};
pub use envelope::{ControlEnvelope, EnvelopeType, PeerContext};
pub use error::{ControlError, ControlResult};
pub use replay::ReplayCache;
