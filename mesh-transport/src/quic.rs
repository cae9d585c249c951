// Copyright (c) 2024 Mesh Overlay Contributors

//! QUIC transport (§4.4) built on `quinn`. Certificate validation does not
//! use a CA chain: the remote's presented SPKI hash is checked against
//! [`mesh_certs::CertificateStore`], either against a descriptor-sourced pin
//! (strict mode) or recorded on first contact (TOFU).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig, Endpoint, ServerConfig};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use sha2::{Digest, Sha256};

use mesh_certs::{CertificateStore, Plane};

use crate::error::{TransportError, TransportResult};

/// Maximum bytes accepted for a single control/data envelope (§4.4).
pub const MAX_ENVELOPE_PAYLOAD_BYTES: usize = 64 * 1024;
/// Maximum bytes accepted for a single remote blob, e.g. a DHT value (§4.4).
pub const MAX_REMOTE_BLOB_BYTES: usize = 1024 * 1024;

/// Reject an inbound payload before any deserialization runs (§4.4 payload
/// caps, enforced ahead of cryptographic/parsing work).
pub fn enforce_payload_cap(payload: &[u8], max: usize) -> TransportResult<()> {
    if payload.len() > max {
        Err(TransportError::PayloadTooLarge {
            actual: payload.len(),
            max,
        })
    } else {
        Ok(())
    }
}

fn spki_sha256(cert_der: &CertificateDer<'_>) -> TransportResult<[u8; 32]> {
    use der::Decode;
    let cert = x509_cert::Certificate::from_der(cert_der.as_ref())
        .map_err(|e| TransportError::Io(e.to_string()))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| TransportError::Io(e.to_string()))?;
    let mut hasher = Sha256::new();
    hasher.update(&spki_der);
    Ok(hasher.finalize().into())
}

/// Builds a `rustls::ServerConfig`-backed `quinn::ServerConfig` from a
/// persisted plane certificate.
pub fn build_server_config(
    cert_der: Vec<u8>,
    key_der: Vec<u8>,
) -> TransportResult<ServerConfig> {
    let cert = CertificateDer::from(cert_der);
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der));
    let server_config = ServerConfig::with_single_cert(vec![cert], key)
        .map_err(|e| TransportError::Io(e.to_string()))?;
    Ok(server_config)
}

/// A pin/TOFU-checking certificate verifier replacing CA chain validation.
/// Records the presented SPKI into `store` under `(endpoint, plane)` via
/// `verify_or_record`; rejects on mismatch, and rejects missing pins when
/// `strict` is set.
#[derive(Debug)]
struct PinningVerifier {
    store: Arc<CertificateStore>,
    endpoint: String,
    plane: Plane,
    strict: bool,
}

impl ServerCertVerifier for PinningVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let spki_bytes =
            spki_sha256(end_entity).map_err(|e| rustls::Error::General(e.to_string()))?;
        let now_ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.store
            .verify_or_record(&self.endpoint, self.plane, &spki_bytes, self.strict, now_ms)
            .map_err(|e| rustls::Error::General(e.to_string()))?;
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ED25519,
        ]
    }
}

/// Builds a `quinn::ClientConfig` that validates the remote's certificate
/// through `store` instead of a CA chain.
pub fn build_client_config(
    store: Arc<CertificateStore>,
    endpoint: String,
    plane: Plane,
    strict: bool,
) -> TransportResult<ClientConfig> {
    let verifier = Arc::new(PinningVerifier {
        store,
        endpoint,
        plane,
        strict,
    });
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut tls_config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::Io(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    tls_config.alpn_protocols = vec![b"mesh-overlay/1".to_vec()];
    let quic_client_config = quinn::crypto::rustls::QuicClientConfig::try_from(tls_config)
        .map_err(|e| TransportError::Io(e.to_string()))?;
    Ok(ClientConfig::new(Arc::new(quic_client_config)))
}

/// A bound QUIC endpoint serving one plane (control or data).
pub struct QuicEndpoint {
    endpoint: Endpoint,
}

impl QuicEndpoint {
    /// Bind a new endpoint at `bind_addr` serving both inbound and outbound
    /// connections for one plane.
    pub fn bind(
        bind_addr: SocketAddr,
        server_config: ServerConfig,
        client_config: ClientConfig,
    ) -> TransportResult<Self> {
        let mut endpoint =
            Endpoint::server(server_config, bind_addr).map_err(|e| TransportError::Io(e.to_string()))?;
        endpoint.set_default_client_config(client_config);
        Ok(Self { endpoint })
    }

    /// Dial `addr`, presenting `server_name` for SNI (the remote `PeerId`'s
    /// endpoint host), with `timeout` bounding the whole handshake.
    pub async fn dial(
        &self,
        addr: SocketAddr,
        server_name: &str,
        timeout: Duration,
    ) -> TransportResult<quinn::Connection> {
        let connecting = self
            .endpoint
            .connect(addr, server_name)
            .map_err(|e| TransportError::Io(e.to_string()))?;
        tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| TransportError::DialTimeout(addr.to_string()))?
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    /// Accept the next inbound connection, bounding the handshake by
    /// `timeout`.
    pub async fn accept(&self, timeout: Duration) -> TransportResult<Option<quinn::Connection>> {
        let Some(incoming) = self.endpoint.accept().await else {
            return Ok(None);
        };
        let connecting = incoming
            .accept()
            .map_err(|e| TransportError::Io(e.to_string()))?;
        let conn = tokio::time::timeout(timeout, connecting)
            .await
            .map_err(|_| TransportError::TlsHandshakeTimeout("inbound".into()))?
            .map_err(|e| TransportError::Io(e.to_string()))?;
        Ok(Some(conn))
    }

    /// The local address this endpoint is bound to.
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        self.endpoint
            .local_addr()
            .map_err(|e| TransportError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_within_cap_is_accepted() {
        let payload = vec![0u8; MAX_ENVELOPE_PAYLOAD_BYTES];
        assert!(enforce_payload_cap(&payload, MAX_ENVELOPE_PAYLOAD_BYTES).is_ok());
    }

    #[test]
    fn payload_over_cap_is_rejected() {
        let payload = vec![0u8; MAX_ENVELOPE_PAYLOAD_BYTES + 1];
        let result = enforce_payload_cap(&payload, MAX_ENVELOPE_PAYLOAD_BYTES);
        assert!(matches!(
            result,
            Err(TransportError::PayloadTooLarge { .. })
        ));
    }

    #[test]
    fn blob_cap_is_independent_of_envelope_cap() {
        let payload = vec![0u8; MAX_ENVELOPE_PAYLOAD_BYTES + 1];
        assert!(enforce_payload_cap(&payload, MAX_REMOTE_BLOB_BYTES).is_ok());
    }
}
