// Copyright (c) 2024 Mesh Overlay Contributors

//! Small-world neighbor manager (§4.7): promotes candidates with enough
//! successful interactions into the neighbor set, demotes neighbors that
//! go quiet or fail repeatedly, and selects peers for a sync cycle —
//! neighbors due for sync first, then random candidates to round out the
//! requested count.

use std::collections::HashMap;

use mesh_common::config::NeighborConfig;
use mesh_common::PeerId;
use rand::seq::SliceRandom;
use tokio::sync::RwLock;

use crate::error::{NeighborError, NeighborResult};
use crate::record::{NeighborRecord, NeighborStatus};

/// Tracks every known peer's neighbor/candidate status and drives
/// promotion, demotion, and sync-cycle selection.
pub struct NeighborManager {
    config: NeighborConfig,
    peers: RwLock<HashMap<PeerId, NeighborRecord>>,
}

impl NeighborManager {
    /// Build an empty manager from the neighbor-management configuration
    /// section.
    pub fn new(config: NeighborConfig) -> Self {
        Self {
            config,
            peers: RwLock::new(HashMap::new()),
        }
    }

    /// Number of peers currently holding a neighbor slot.
    pub async fn neighbor_count(&self) -> usize {
        self.peers
            .read()
            .await
            .values()
            .filter(|r| r.status() == NeighborStatus::Neighbor)
            .count()
    }

    /// Number of peers sitting in the candidate pool.
    pub async fn candidate_count(&self) -> usize {
        self.peers
            .read()
            .await
            .values()
            .filter(|r| r.status() == NeighborStatus::Candidate)
            .count()
    }

    /// Record a newly discovered peer as a candidate, subject to the
    /// candidate-pool cap. A peer already tracked (neighbor or candidate)
    /// is left untouched.
    pub async fn observe_candidate(&self, peer: PeerId, now_ms: u64) -> NeighborResult<()> {
        let mut peers = self.peers.write().await;
        if peers.contains_key(&peer) {
            return Ok(());
        }
        let candidate_count = peers
            .values()
            .filter(|r| r.status() == NeighborStatus::Candidate)
            .count();
        if candidate_count >= self.config.candidate_cap {
            return Err(NeighborError::CandidatePoolFull {
                cap: self.config.candidate_cap,
            });
        }
        peers.insert(peer, NeighborRecord::new_candidate(now_ms));
        Ok(())
    }

    /// Record a successful interaction with `peer`, promoting it out of
    /// the candidate pool when its success streak crosses the promotion
    /// threshold and a neighbor slot is free.
    pub async fn record_success(&self, peer: &PeerId, now_ms: u64) -> NeighborResult<()> {
        let mut peers = self.peers.write().await;
        let neighbor_count = peers
            .values()
            .filter(|r| r.status() == NeighborStatus::Neighbor)
            .count();
        let record = peers.get_mut(peer).ok_or(NeighborError::UnknownPeer)?;
        record.record_success(now_ms, self.config.neighbor_sync_interval.as_millis() as u64);
        if record.status() == NeighborStatus::Candidate
            && record.success_streak() >= self.config.promotion_threshold
            && neighbor_count < self.config.target_neighbors
        {
            record.promote();
            tracing::debug!(%peer, "promoted to neighbor");
        }
        Ok(())
    }

    /// Record a failed interaction with `peer`, demoting it back to the
    /// candidate pool when its failure streak crosses the demotion
    /// threshold.
    pub async fn record_failure(&self, peer: &PeerId, now_ms: u64) -> NeighborResult<()> {
        let mut peers = self.peers.write().await;
        let record = peers.get_mut(peer).ok_or(NeighborError::UnknownPeer)?;
        record.record_failure(now_ms, self.config.neighbor_sync_interval.as_millis() as u64);
        if record.status() == NeighborStatus::Neighbor
            && record.failure_streak() >= self.config.demotion_threshold
        {
            record.demote();
            tracing::debug!(%peer, "demoted to candidate");
        }
        Ok(())
    }

    /// Demote any neighbor that has gone silent past the configured idle
    /// timeout.
    pub async fn sweep_idle(&self, now_ms: u64) {
        let idle_timeout_ms = self.config.neighbor_idle_timeout.as_millis() as u64;
        let mut peers = self.peers.write().await;
        for (peer, record) in peers.iter_mut() {
            if record.status() == NeighborStatus::Neighbor && record.is_idle(now_ms, idle_timeout_ms) {
                record.demote();
                tracing::debug!(%peer, "demoted for idleness");
            }
        }
    }

    /// Select peers for a sync cycle: neighbors due for sync first
    /// (earliest-due first), then random candidates to fill out `count`.
    pub async fn select_for_sync_cycle(&self, now_ms: u64, count: usize) -> Vec<PeerId> {
        let peers = self.peers.read().await;

        let mut due_neighbors: Vec<(&PeerId, &NeighborRecord)> = peers
            .iter()
            .filter(|(_, r)| r.status() == NeighborStatus::Neighbor && r.is_due(now_ms))
            .collect();
        due_neighbors.sort_by_key(|(_, r)| r.next_sync_due_ms());

        let mut selected: Vec<PeerId> = due_neighbors
            .into_iter()
            .take(count)
            .map(|(peer, _)| peer.clone())
            .collect();

        if selected.len() < count {
            let remaining = count - selected.len();
            let mut candidates: Vec<&PeerId> = peers
                .iter()
                .filter(|(_, r)| r.status() == NeighborStatus::Candidate)
                .map(|(peer, _)| peer)
                .collect();
            candidates.shuffle(&mut rand::thread_rng());
            selected.extend(candidates.into_iter().take(remaining).cloned());
        }

        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(seed: u8) -> PeerId {
        PeerId::from_public_key(&[seed; 32])
    }

    fn test_config() -> NeighborConfig {
        let mut cfg = NeighborConfig::default();
        cfg.target_neighbors = 2;
        cfg.promotion_threshold = 3;
        cfg.demotion_threshold = 3;
        cfg.candidate_cap = 5;
        cfg
    }

    #[tokio::test]
    async fn observe_candidate_is_idempotent() {
        let manager = NeighborManager::new(test_config());
        manager.observe_candidate(peer(1), 0).await.unwrap();
        manager.observe_candidate(peer(1), 100).await.unwrap();
        assert_eq!(manager.candidate_count().await, 1);
    }

    #[tokio::test]
    async fn candidate_pool_rejects_beyond_cap() {
        let manager = NeighborManager::new(test_config());
        for i in 0..5 {
            manager.observe_candidate(peer(i), 0).await.unwrap();
        }
        assert!(matches!(
            manager.observe_candidate(peer(99), 0).await,
            Err(NeighborError::CandidatePoolFull { cap: 5 })
        ));
    }

    #[tokio::test]
    async fn three_successes_promote_when_room_exists() {
        let manager = NeighborManager::new(test_config());
        let p = peer(1);
        manager.observe_candidate(p.clone(), 0).await.unwrap();
        manager.record_success(&p, 100, ).await.unwrap();
        manager.record_success(&p, 200).await.unwrap();
        assert_eq!(manager.neighbor_count().await, 0);
        manager.record_success(&p, 300).await.unwrap();
        assert_eq!(manager.neighbor_count().await, 1);
    }

    #[tokio::test]
    async fn promotion_is_withheld_when_neighbor_slots_are_full() {
        let manager = NeighborManager::new(test_config());
        for i in 0..2u8 {
            let p = peer(i);
            manager.observe_candidate(p.clone(), 0).await.unwrap();
            for t in 0..3u64 {
                manager.record_success(&p, t * 100).await.unwrap();
            }
        }
        assert_eq!(manager.neighbor_count().await, 2);

        let extra = peer(9);
        manager.observe_candidate(extra.clone(), 0).await.unwrap();
        for t in 0..3u64 {
            manager.record_success(&extra, t * 100).await.unwrap();
        }
        assert_eq!(manager.neighbor_count().await, 2);
    }

    #[tokio::test]
    async fn three_consecutive_failures_demote_a_neighbor() {
        let manager = NeighborManager::new(test_config());
        let p = peer(1);
        manager.observe_candidate(p.clone(), 0).await.unwrap();
        for t in 0..3u64 {
            manager.record_success(&p, t * 100).await.unwrap();
        }
        assert_eq!(manager.neighbor_count().await, 1);

        for t in 0..3u64 {
            manager.record_failure(&p, 1_000 + t * 100).await.unwrap();
        }
        assert_eq!(manager.neighbor_count().await, 0);
        assert_eq!(manager.candidate_count().await, 1);
    }

    #[tokio::test]
    async fn sweep_idle_demotes_silent_neighbors() {
        let manager = NeighborManager::new(test_config());
        let p = peer(1);
        manager.observe_candidate(p.clone(), 0).await.unwrap();
        for t in 0..3u64 {
            manager.record_success(&p, t * 100).await.unwrap();
        }
        assert_eq!(manager.neighbor_count().await, 1);

        let idle_timeout_ms = test_config().neighbor_idle_timeout.as_millis() as u64;
        manager.sweep_idle(idle_timeout_ms + 1_000_000).await;
        assert_eq!(manager.neighbor_count().await, 0);
    }

    #[tokio::test]
    async fn selection_prefers_due_neighbors_then_fills_with_candidates() {
        let manager = NeighborManager::new(test_config());
        let neighbor = peer(1);
        manager.observe_candidate(neighbor.clone(), 0).await.unwrap();
        for t in 0..3u64 {
            manager.record_success(&neighbor, t * 100).await.unwrap();
        }
        let due_ms = manager
            .select_for_sync_cycle(0, 5)
            .await;
        // Neighbor just synced, not yet due; candidate pool is otherwise empty.
        assert!(due_ms.is_empty());

        manager.observe_candidate(peer(2), 0).await.unwrap();
        manager.observe_candidate(peer(3), 0).await.unwrap();
        let far_future = test_config().neighbor_sync_interval.as_millis() as u64 + 1_000_000;
        let selected = manager.select_for_sync_cycle(far_future, 2).await;
        assert_eq!(selected.len(), 2);
        assert!(selected.contains(&neighbor));
    }

    #[tokio::test]
    async fn unknown_peer_operations_error() {
        let manager = NeighborManager::new(test_config());
        assert!(matches!(
            manager.record_success(&peer(1), 0).await,
            Err(NeighborError::UnknownPeer)
        ));
        assert!(matches!(
            manager.record_failure(&peer(1), 0).await,
            Err(NeighborError::UnknownPeer)
        ));
    }
}
