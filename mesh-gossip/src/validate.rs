// Copyright (c) 2024 Mesh Overlay Contributors

//! The structural/consistency/proof-of-possession validation pipeline for
//! incoming [`HashEntry`](crate::hashdb::HashEntry) values (§4.6).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::error::{GossipError, GossipResult};
use crate::hashdb::HashEntry;

static FLAC_KEY_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9/_.\-]+$").unwrap());
static BYTE_HASH_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-f]{64}$").unwrap());

/// Step 1 (§4.6): structural validation of a single entry, independent of
/// any other entry or database state.
pub fn validate_structural(entry: &HashEntry, max_flac_key_len: usize, size_cap: i64) -> GossipResult<()> {
    if entry.flac_key.is_empty()
        || entry.flac_key.len() > max_flac_key_len
        || !FLAC_KEY_PATTERN.is_match(&entry.flac_key)
    {
        return Err(GossipError::InvalidFlacKey(entry.flac_key.clone()));
    }
    if !BYTE_HASH_PATTERN.is_match(&entry.byte_hash_hex) {
        return Err(GossipError::InvalidByteHash(entry.byte_hash_hex.clone()));
    }
    if entry.size < 0 || entry.size > size_cap {
        return Err(GossipError::SizeExceedsCap {
            size: entry.size,
            cap: size_cap,
        });
    }
    if entry.seq_id < 0 {
        return Err(GossipError::NegativeSeqId(entry.seq_id));
    }
    Ok(())
}

/// Step 2 (§4.6): no duplicate `(FlacKey, ByteHash)` with conflicting
/// `Size` within a single batch of incoming entries.
pub fn validate_consistency(entries: &[HashEntry]) -> GossipResult<()> {
    let mut seen: HashMap<(&str, &str), i64> = HashMap::new();
    for entry in entries {
        let key = (entry.flac_key.as_str(), entry.byte_hash_hex.as_str());
        match seen.get(&key) {
            Some(&size) if size != entry.size => return Err(GossipError::ConflictingSize),
            Some(_) => {}
            None => {
                seen.insert(key, entry.size);
            }
        }
    }
    Ok(())
}

/// Step 3 (§4.6): proof-of-possession. The verifier requests
/// `requested_prefix_len` bytes at offset 0 from the claimant. When the
/// entry's claimed `full_size` fits entirely within that requested length,
/// `ByteHash` is exactly the hash of the returned bytes, so this is a full,
/// exact check. When the file is larger than the requested prefix, no
/// partial digest can equal the whole-file digest, so the check degrades to
/// a liveness/possession heuristic: the claimant must actually return the
/// full requested length at offset 0, rather than an empty or truncated
/// reply that would indicate it doesn't hold the file at all. See
/// DESIGN.md for this tradeoff.
pub fn verify_proof_of_possession(
    byte_hash_hex: &str,
    full_size: i64,
    requested_prefix_len: usize,
    prefix_bytes: &[u8],
) -> GossipResult<()> {
    let expected = hex::decode(byte_hash_hex)
        .map_err(|_| GossipError::InvalidByteHash(byte_hash_hex.to_string()))?;

    if full_size <= requested_prefix_len as i64 {
        let actual = Sha256::digest(prefix_bytes);
        return if actual.as_slice() == expected.as_slice() {
            Ok(())
        } else {
            Err(GossipError::ProofOfPossessionFailed(
                "prefix digest mismatch".to_string(),
            ))
        };
    }

    if prefix_bytes.len() < requested_prefix_len {
        return Err(GossipError::ProofOfPossessionFailed(
            "claimant returned fewer bytes than requested for a file larger than the prefix".to_string(),
        ));
    }
    Ok(())
}
