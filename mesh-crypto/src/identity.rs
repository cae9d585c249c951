// Copyright (c) 2024 Mesh Overlay Contributors

//! [`IdentityStore`] (C1): the single-purpose store for a node's Ed25519
//! identity keypair.
//!
//! On first load: generate a keypair, persist it as a JSON record with
//! owner-only permissions. On subsequent loads: read the file back. A
//! present-but-malformed file is a fatal startup error unless the operator
//! explicitly opts into regeneration — silently regenerating on read failure
//! would silently discard a node's identity.

use crate::error::{CryptoError, CryptoResult};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use mesh_common::PeerId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize)]
struct IdentityRecord {
    public_key_b64: String,
    private_key_b64: String,
    created_ms: u64,
}

/// Persisted Ed25519 node identity. `Sign` is invoked behind this owning
/// object; the private key is never cloned or copied out raw.
pub struct IdentityStore {
    signing_key: SigningKey,
    peer_id: PeerId,
    created_ms: u64,
    path: PathBuf,
}

impl IdentityStore {
    /// Load the identity at `path`, creating a new one if the file does not
    /// exist. If the file exists but cannot be parsed, refuse to start
    /// unless `allow_regenerate_on_corruption` is set by the operator.
    pub fn load_or_create(
        path: impl AsRef<Path>,
        allow_regenerate_on_corruption: bool,
    ) -> CryptoResult<Self> {
        let path = path.as_ref().to_path_buf();
        match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<IdentityRecord>(&bytes) {
                Ok(record) => Self::from_record(record, path),
                Err(err) => {
                    if allow_regenerate_on_corruption {
                        tracing::warn!(
                            error = %err,
                            path = %path.display(),
                            "identity file malformed; regenerating because operator opted in"
                        );
                        Self::create(path)
                    } else {
                        tracing::error!(
                            error = %err,
                            path = %path.display(),
                            "identity file malformed; refusing to start (this prevents silent identity loss)"
                        );
                        Err(CryptoError::MalformedIdentity(err.to_string()))
                    }
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::create(path),
            Err(err) => Err(CryptoError::Io(err.to_string())),
        }
    }

    fn from_record(record: IdentityRecord, path: PathBuf) -> CryptoResult<Self> {
        let private_bytes = base64_decode(&record.private_key_b64)?;
        let bytes: [u8; 32] = private_bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("private key must be 32 bytes".into()))?;
        let signing_key = SigningKey::from_bytes(&bytes);
        let peer_id = PeerId::from_public_key(signing_key.verifying_key().as_bytes());
        Ok(Self {
            signing_key,
            peer_id,
            created_ms: record.created_ms,
            path,
        })
    }

    fn create(path: PathBuf) -> CryptoResult<Self> {
        let mut rng = rand::rngs::OsRng;
        let signing_key = SigningKey::generate(&mut rng);
        let created_ms = now_ms();
        let record = IdentityRecord {
            public_key_b64: base64_encode(signing_key.verifying_key().as_bytes()),
            private_key_b64: base64_encode(&signing_key.to_bytes()),
            created_ms,
        };
        let bytes = serde_json::to_vec(&record)?;
        write_owner_only(&path, &bytes)?;
        let peer_id = PeerId::from_public_key(signing_key.verifying_key().as_bytes());
        tracing::info!(peer_id = %peer_id, path = %path.display(), "generated new node identity");
        Ok(Self {
            signing_key,
            peer_id,
            created_ms,
            path,
        })
    }

    /// The node's stable `PeerId`, derived from `hex(SHA256(public_key))`.
    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// The 32-byte Ed25519 public key.
    pub fn public_key(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Sign `data`, returning the 64-byte Ed25519 signature.
    pub fn sign(&self, data: &[u8]) -> [u8; 64] {
        self.signing_key.sign(data).to_bytes()
    }

    /// When this identity was created, in milliseconds since the epoch.
    pub fn created_ms(&self) -> u64 {
        self.created_ms
    }

    /// Path this identity is persisted at.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Verify a 64-byte Ed25519 signature over `data` with the given 32-byte
/// public key. Used by every upper layer that checks a descriptor or
/// envelope signature (C3/C5).
pub fn verify(public_key: &[u8; 32], data: &[u8], signature: &[u8; 64]) -> CryptoResult<()> {
    let verifying_key =
        VerifyingKey::from_bytes(public_key).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    let signature = Signature::from_bytes(signature);
    verifying_key
        .verify(data, &signature)
        .map_err(|_| CryptoError::VerificationFailed)
}

fn base64_encode(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

fn base64_decode(s: &str) -> CryptoResult<Vec<u8>> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(unix)]
fn write_owner_only(path: &Path, bytes: &[u8]) -> CryptoResult<()> {
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    use std::io::Write;
    file.write_all(bytes)?;
    Ok(())
}

#[cfg(not(unix))]
fn write_owner_only(path: &Path, bytes: &[u8]) -> CryptoResult<()> {
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_stable_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh-identity.key");

        let first = IdentityStore::load_or_create(&path, false).unwrap();
        let first_id = first.peer_id().clone();
        drop(first);

        let second = IdentityStore::load_or_create(&path, false).unwrap();
        assert_eq!(first_id, *second.peer_id());
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh-identity.key");
        let store = IdentityStore::load_or_create(&path, false).unwrap();

        let data = b"canonical envelope bytes";
        let sig = store.sign(data);
        verify(&store.public_key(), data, &sig).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh-identity.key");
        let store = IdentityStore::load_or_create(&path, false).unwrap();

        let sig = store.sign(b"original");
        assert!(verify(&store.public_key(), b"tampered", &sig).is_err());
    }

    #[test]
    fn peer_id_matches_public_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh-identity.key");
        let store = IdentityStore::load_or_create(&path, false).unwrap();

        assert!(store.peer_id().matches_public_key(&store.public_key()));
    }

    #[test]
    fn malformed_file_refuses_to_start_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh-identity.key");
        std::fs::write(&path, b"not json").unwrap();

        let result = IdentityStore::load_or_create(&path, false);
        assert!(matches!(result, Err(CryptoError::MalformedIdentity(_))));
    }

    #[test]
    fn malformed_file_regenerates_when_operator_opts_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh-identity.key");
        std::fs::write(&path, b"not json").unwrap();

        let result = IdentityStore::load_or_create(&path, true);
        assert!(result.is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn file_is_owner_only_on_unix() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mesh-identity.key");
        let _store = IdentityStore::load_or_create(&path, false).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
