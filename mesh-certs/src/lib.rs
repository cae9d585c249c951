// Copyright (c) 2024 Mesh Overlay Contributors

//! Per-plane TLS certificate storage and SPKI pin registry with rotation and
//! trust-on-first-use (C2).

#![warn(missing_docs)]

pub mod error;
pub mod pin;
pub mod store;

pub use error::{CertsError, CertsResult};
pub use pin::{Pin, PinSource, Plane};
pub use store::CertificateStore;
