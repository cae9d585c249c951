// Copyright (c) 2024 Mesh Overlay Contributors

//! Replay/time check (§4.5 step 1): a per-peer bounded map of recently seen
//! `(PeerId, MessageId)` pairs, LRU by timestamp, with a janitor sweep that
//! evicts entries older than the replay window (default 10 minutes). Clock
//! skew tolerance is a hard property: messages outside the window are never
//! accepted, never retried, and never buffered.

use std::collections::{HashMap, VecDeque};

use mesh_common::PeerId;

use crate::error::{ControlError, ControlResult};

struct PeerReplayState {
    seen: std::collections::HashSet<u128>,
    order: VecDeque<(u128, u64)>,
}

impl PeerReplayState {
    fn new() -> Self {
        Self {
            seen: std::collections::HashSet::new(),
            order: VecDeque::new(),
        }
    }

    fn evict_older_than(&mut self, cutoff_ms: u64) {
        while let Some(&(message_id, timestamp_ms)) = self.order.front() {
            if timestamp_ms < cutoff_ms {
                self.order.pop_front();
                self.seen.remove(&message_id);
            } else {
                break;
            }
        }
    }
}

/// Per-peer replay cache guarding against re-processing a `(PeerId,
/// MessageId)` pair already seen within `window_ms`.
pub struct ReplayCache {
    window_ms: u64,
    peers: HashMap<PeerId, PeerReplayState>,
}

impl ReplayCache {
    /// Build a cache with the given replay window (default 10 minutes per §4.5).
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            peers: HashMap::new(),
        }
    }

    /// Check and record `(peer_id, message_id)` at `timestamp_ms`, observed
    /// at wall-clock `now_ms`. Returns an error if this pair was already
    /// recorded within the window; otherwise records it and returns `Ok`.
    pub fn check_and_record(
        &mut self,
        peer_id: &PeerId,
        message_id: u128,
        timestamp_ms: u64,
        now_ms: u64,
    ) -> ControlResult<()> {
        let state = self
            .peers
            .entry(peer_id.clone())
            .or_insert_with(PeerReplayState::new);
        state.evict_older_than(now_ms.saturating_sub(self.window_ms));

        if state.seen.contains(&message_id) {
            return Err(ControlError::Replayed);
        }
        state.seen.insert(message_id);
        state.order.push_back((message_id, timestamp_ms));
        Ok(())
    }

    /// Sweep every tracked peer, evicting entries older than the window
    /// relative to `now_ms`, and drop peers left with no entries. Intended
    /// to run periodically from a janitor task.
    pub fn sweep(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        for state in self.peers.values_mut() {
            state.evict_older_than(cutoff);
        }
        self.peers.retain(|_, state| !state.order.is_empty());
    }

    /// Number of peers currently tracked.
    pub fn tracked_peers(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(seed: u8) -> PeerId {
        PeerId::from_public_key(&[seed; 32])
    }

    #[test]
    fn first_sighting_of_a_message_id_is_accepted() {
        let mut cache = ReplayCache::new(600_000);
        assert!(cache.check_and_record(&peer(1), 42, 1000, 1000).is_ok());
    }

    #[test]
    fn repeated_message_id_within_window_is_rejected() {
        let mut cache = ReplayCache::new(600_000);
        cache.check_and_record(&peer(1), 42, 1000, 1000).unwrap();
        let result = cache.check_and_record(&peer(1), 42, 1000, 1500);
        assert!(matches!(result, Err(ControlError::Replayed)));
    }

    #[test]
    fn same_message_id_from_different_peers_is_independent() {
        let mut cache = ReplayCache::new(600_000);
        cache.check_and_record(&peer(1), 42, 1000, 1000).unwrap();
        assert!(cache.check_and_record(&peer(2), 42, 1000, 1000).is_ok());
    }

    #[test]
    fn entry_expires_after_the_window_and_id_can_reappear() {
        let mut cache = ReplayCache::new(1000);
        cache.check_and_record(&peer(1), 42, 0, 0).unwrap();
        // Past the window: the janitor would have evicted this by now, so a
        // fresh sighting of the same id at a much later time is accepted.
        let result = cache.check_and_record(&peer(1), 42, 5000, 5000);
        assert!(result.is_ok());
    }

    #[test]
    fn sweep_evicts_stale_entries_and_drops_empty_peers() {
        let mut cache = ReplayCache::new(1000);
        cache.check_and_record(&peer(1), 1, 0, 0).unwrap();
        assert_eq!(cache.tracked_peers(), 1);
        cache.sweep(5000);
        assert_eq!(cache.tracked_peers(), 0);
    }
}
