// Copyright (c) 2024 Mesh Overlay Contributors

//! k-of-n consensus over `RESPKEY` answers to a targeted lookup (§4.6).

use std::collections::HashMap;

use crate::error::{GossipError, GossipResult};
use crate::hashdb::HashEntry;

/// Group `answers` by their `(FlacKey, ByteHash, Size)` content key and
/// accept the first group that reaches `min_agreements`. Returns an error
/// if no group reaches the threshold.
pub fn resolve_consensus(answers: &[HashEntry], min_agreements: u32) -> GossipResult<HashEntry> {
    let mut groups: HashMap<(String, String, i64), (u32, &HashEntry)> = HashMap::new();
    for answer in answers {
        let key = (
            answer.flac_key.clone(),
            answer.byte_hash_hex.clone(),
            answer.size,
        );
        let entry = groups.entry(key).or_insert((0, answer));
        entry.0 += 1;
    }
    groups
        .into_values()
        .find(|(count, _)| *count >= min_agreements)
        .map(|(_, entry)| entry.clone())
        .ok_or(GossipError::NoConsensus)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(flac_key: &str, byte_hash_hex: &str, size: i64) -> HashEntry {
        HashEntry {
            seq_id: 0,
            flac_key: flac_key.to_string(),
            byte_hash_hex: byte_hash_hex.to_string(),
            size,
            meta_flags: None,
        }
    }

    #[test]
    fn three_of_five_agreeing_answers_reach_consensus() {
        let h = "a".repeat(64);
        let h2 = "b".repeat(64);
        let answers = vec![
            entry("k", &h, 1000),
            entry("k", &h, 1000),
            entry("k", &h, 1000),
            entry("k", &h2, 999),
        ];
        let result = resolve_consensus(&answers, 3).unwrap();
        assert_eq!(result.byte_hash_hex, h);
    }

    #[test]
    fn two_of_five_agreeing_is_not_enough() {
        let h = "a".repeat(64);
        let answers = vec![entry("k", &h, 1000), entry("k", &h, 1000)];
        assert!(matches!(
            resolve_consensus(&answers, 3),
            Err(GossipError::NoConsensus)
        ));
    }

    #[test]
    fn empty_answer_set_has_no_consensus() {
        assert!(matches!(
            resolve_consensus(&[], 3),
            Err(GossipError::NoConsensus)
        ));
    }

    #[test]
    fn unanimous_agreement_reaches_consensus() {
        let h = "c".repeat(64);
        let answers = vec![entry("k", &h, 5), entry("k", &h, 5), entry("k", &h, 5)];
        let result = resolve_consensus(&answers, 3).unwrap();
        assert_eq!(result.size, 5);
    }
}
