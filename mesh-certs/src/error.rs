// Copyright (c) 2024 Mesh Overlay Contributors

//! Errors raised by certificate generation, loading, and pin management.

use displaydoc::Display;
use thiserror::Error;

/// Errors produced by [`crate::store::CertificateStore`].
#[derive(Debug, Display, Error)]
pub enum CertsError {
    /// certificate generation failed: {0}
    Generation(String),

    /// certificate store I/O failed: {0}
    Io(String),

    /// pin store is malformed: {0}
    MalformedPinStore(String),

    /// SPKI mismatch for endpoint {endpoint} plane {plane:?}
    SpkiMismatch {
        /// The endpoint whose presented SPKI did not match the pin.
        endpoint: String,
        /// Which plane (control/data) the mismatch occurred on.
        plane: crate::pin::Plane,
    },

    /// no pin recorded for endpoint {0} and strict pinning is required
    NoPinInStrictMode(String),
}

impl From<std::io::Error> for CertsError {
    fn from(err: std::io::Error) -> Self {
        CertsError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for CertsError {
    fn from(err: serde_json::Error) -> Self {
        CertsError::MalformedPinStore(err.to_string())
    }
}

impl From<CertsError> for mesh_common::MeshError {
    fn from(err: CertsError) -> Self {
        match err {
            CertsError::SpkiMismatch { .. } | CertsError::NoPinInStrictMode(_) => {
                mesh_common::MeshError::transport_error(err.to_string())
            }
            other => mesh_common::MeshError::configuration_error(other.to_string()),
        }
    }
}

/// Convenience alias for `Result<T, CertsError>`.
pub type CertsResult<T> = Result<T, CertsError>;
