// Copyright (c) 2024 Mesh Overlay Contributors

//! [`CertificateStore`] (C2): persists a per-plane TLS certificate and
//! manages the SPKI pin registry with rotation and TOFU.

use crate::error::{CertsError, CertsResult};
use crate::pin::{Pin, PinSource, Plane};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::{Duration, SystemTime};

/// A generated, persisted certificate for one plane.
pub struct PlaneCertificate {
    /// DER-encoded certificate bytes.
    pub cert_der: Vec<u8>,
    /// DER-encoded private key bytes.
    pub key_der: Vec<u8>,
}

impl PlaneCertificate {
    /// SPKI SHA-256 of this certificate, computed from the exported
    /// SubjectPublicKeyInfo bytes so the hash is deterministic across key
    /// types (ECDSA P-256 preferred, RSA-2048 fallback per §4.2).
    pub fn spki_sha256(&self) -> [u8; 32] {
        spki_sha256_from_cert_der(&self.cert_der)
    }
}

/// Extract the SubjectPublicKeyInfo sub-structure from a DER certificate and
/// hash it. `rcgen`-generated certs place the SPKI at a fixed position we
/// derive via the `x509-cert` parser; any parse failure here indicates the
/// certificate itself is malformed, which is a configuration error.
fn spki_sha256_from_cert_der(cert_der: &[u8]) -> [u8; 32] {
    use der::Decode;
    use x509_cert::Certificate;

    let cert = Certificate::from_der(cert_der).expect("rcgen always emits parseable certs");
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .expect("SPKI re-encodes");
    let digest = Sha256::digest(&spki_der);
    digest.into()
}

#[derive(Serialize, Deserialize, Default)]
struct PinFile {
    pins: Vec<Pin>,
}

/// Persists per-plane certificates and manages the SPKI pin registry.
///
/// Certificates are cached in-memory once loaded/created; the pin registry
/// is persisted as JSON (`mesh-pins.json`, §6) behind an `RwLock` so many
/// readers (connection acceptors checking a pin) never block each other and
/// writers (recording a new pin) are exclusive.
pub struct CertificateStore {
    certs_dir: PathBuf,
    pin_store_path: PathBuf,
    pins: RwLock<HashMap<(String, PlaneKey), Pin>>,
    pin_rotation_overlap: Duration,
}

#[derive(Clone, Copy, Eq, PartialEq, Hash)]
enum PlaneKey {
    Control,
    Data,
}

impl From<Plane> for PlaneKey {
    fn from(p: Plane) -> Self {
        match p {
            Plane::Control => PlaneKey::Control,
            Plane::Data => PlaneKey::Data,
        }
    }
}

impl CertificateStore {
    /// Open a certificate store rooted at `certs_dir`, loading any existing
    /// pin file at `pin_store_path`.
    pub fn open(
        certs_dir: impl Into<PathBuf>,
        pin_store_path: impl Into<PathBuf>,
        pin_rotation_overlap: Duration,
    ) -> CertsResult<Self> {
        let pin_store_path = pin_store_path.into();
        let pins = match std::fs::read(&pin_store_path) {
            Ok(bytes) => {
                let file: PinFile = serde_json::from_slice(&bytes)?;
                file.pins
                    .into_iter()
                    .map(|p| ((p.endpoint.clone(), p.plane.into()), p))
                    .collect()
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            certs_dir: certs_dir.into(),
            pin_store_path,
            pins: RwLock::new(pins),
            pin_rotation_overlap,
        })
    }

    /// Load the plane certificate from disk, or generate and persist a new
    /// one if absent. `validity` is typically 5 years (§3 lifecycle).
    pub fn load_or_create(
        &self,
        plane: Plane,
        common_name: &str,
        validity: Duration,
    ) -> CertsResult<PlaneCertificate> {
        let path = self.cert_path(plane);
        match std::fs::read(&path) {
            Ok(bytes) => {
                let stored: StoredCert = serde_json::from_slice(&bytes)?;
                Ok(PlaneCertificate {
                    cert_der: stored.cert_der,
                    key_der: stored.key_der,
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                let generated = generate_certificate(common_name, validity)?;
                let stored = StoredCert {
                    cert_der: generated.cert_der.clone(),
                    key_der: generated.key_der.clone(),
                };
                let bytes = serde_json::to_vec(&stored)?;
                write_owner_only(&path, &bytes)?;
                tracing::info!(?plane, common_name, "generated new plane certificate");
                Ok(generated)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Look up the current (and, if mid-rotation, previous) accepted SPKI
    /// hash for an endpoint/plane.
    pub fn pin_for(&self, endpoint: &str, plane: Plane) -> Option<Pin> {
        self.pins
            .read()
            .expect("pin store lock poisoned")
            .get(&(endpoint.to_string(), plane.into()))
            .cloned()
    }

    /// Verify a presented SPKI hash against the recorded pin, recording a
    /// TOFU pin if none exists (unless `strict` forbids it).
    pub fn verify_or_record(
        &self,
        endpoint: &str,
        plane: Plane,
        presented_spki_sha256: &[u8; 32],
        strict: bool,
        now_ms: u64,
    ) -> CertsResult<()> {
        let hex_hash = hex::encode(presented_spki_sha256);
        match self.pin_for(endpoint, plane) {
            Some(pin) if pin.accepts(&hex_hash, now_ms) => Ok(()),
            Some(_) => Err(CertsError::SpkiMismatch {
                endpoint: endpoint.to_string(),
                plane,
            }),
            None if strict => Err(CertsError::NoPinInStrictMode(endpoint.to_string())),
            None => {
                self.record_pin(endpoint, plane, &hex_hash, PinSource::Tofu, now_ms)?;
                Ok(())
            }
        }
    }

    /// Record (or rotate) a pin for an endpoint/plane.
    pub fn record_pin(
        &self,
        endpoint: &str,
        plane: Plane,
        spki_sha256_hex: &str,
        source: PinSource,
        now_ms: u64,
    ) -> CertsResult<()> {
        let mut pins = self.pins.write().expect("pin store lock poisoned");
        let key = (endpoint.to_string(), plane.into());

        let new_pin = match pins.get(&key) {
            Some(existing) if existing.spki_sha256 != spki_sha256_hex => Pin {
                endpoint: endpoint.to_string(),
                plane,
                spki_sha256: spki_sha256_hex.to_string(),
                learned_at_ms: now_ms,
                source,
                previous_spki_sha256: Some(existing.spki_sha256.clone()),
                previous_expires_at_ms: Some(
                    now_ms + self.pin_rotation_overlap.as_millis() as u64,
                ),
            },
            Some(existing) => existing.clone(),
            None => Pin {
                endpoint: endpoint.to_string(),
                plane,
                spki_sha256: spki_sha256_hex.to_string(),
                learned_at_ms: now_ms,
                source,
                previous_spki_sha256: None,
                previous_expires_at_ms: None,
            },
        };
        pins.insert(key, new_pin);
        self.persist_locked(&pins)
    }

    fn persist_locked(&self, pins: &HashMap<(String, PlaneKey), Pin>) -> CertsResult<()> {
        let file = PinFile {
            pins: pins.values().cloned().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_owner_only(&self.pin_store_path, &bytes)?;
        Ok(())
    }

    fn cert_path(&self, plane: Plane) -> PathBuf {
        match plane {
            Plane::Control => self.certs_dir.join("mesh-overlay-control.pfx"),
            Plane::Data => self.certs_dir.join("mesh-overlay-data.pfx"),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCert {
    cert_der: Vec<u8>,
    key_der: Vec<u8>,
}

fn generate_certificate(common_name: &str, validity: Duration) -> CertsResult<PlaneCertificate> {
    let mut params = rcgen::CertificateParams::new(vec![common_name.to_string()]);
    params.not_after = (SystemTime::now() + validity).into();
    let cert = rcgen::Certificate::from_params(params)
        .map_err(|e| CertsError::Generation(e.to_string()))?;
    let cert_der = cert
        .serialize_der()
        .map_err(|e| CertsError::Generation(e.to_string()))?;
    let key_der = cert.serialize_private_key_der();
    Ok(PlaneCertificate { cert_der, key_der })
}

#[cfg(unix)]
fn write_owner_only(path: &Path, bytes: &[u8]) -> CertsResult<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, bytes: &[u8]) -> CertsResult<()> {
    std::fs::write(path, bytes)?;
    Ok(())
}
