// Copyright (c) 2024 Mesh Overlay Contributors

//! Per-peer invalid-entry/invalid-message rate limiting and quarantine
//! (§4.6), generalized from the teacher's `PeerRateLimiter`/`PeerRateState`
//! sliding-window design: a rolling window of timestamps per peer, a
//! violation counter, and a quarantine deadline once the violation
//! threshold is crossed within the window. Retargeted from "messages per
//! minute" to the §4.6 windows (5-minute rolling window, counted
//! separately for invalid entries and invalid messages) and thresholds.
//!
//! Rate limiting is for invalids, not all traffic (§8 property 9): recording
//! an invalid event never itself blocks anything; only [`GossipRateLimiter::check_admission`]
//! rejects, and only while quarantined.

use std::collections::{HashMap, VecDeque};

use mesh_common::config::GossipConfig;
use mesh_common::PeerId;

use crate::error::{GossipError, GossipResult};

fn evict_older_than(queue: &mut VecDeque<u64>, cutoff_ms: u64) {
    while let Some(&t) = queue.front() {
        if t < cutoff_ms {
            queue.pop_front();
        } else {
            break;
        }
    }
}

/// Rolling-window rate-limit and quarantine state for a single peer.
#[derive(Debug, Default)]
struct PeerGossipState {
    invalid_entries: VecDeque<u64>,
    invalid_messages: VecDeque<u64>,
    violations: u32,
    quarantined_until_ms: Option<u64>,
}

/// Tracks invalid-entry/invalid-message counts per peer within a rolling
/// window, counts violations when thresholds are exceeded, and quarantines
/// peers that accumulate enough violations.
pub struct GossipRateLimiter {
    window_ms: u64,
    max_invalid_entries: u32,
    max_invalid_messages: u32,
    quarantine_violation_threshold: u32,
    quarantine_duration_ms: u64,
    peers: HashMap<PeerId, PeerGossipState>,
}

impl GossipRateLimiter {
    /// Build a rate limiter from the hash-gossip configuration section.
    pub fn new(config: &GossipConfig) -> Self {
        Self {
            window_ms: config.rate_limit_window.as_millis() as u64,
            max_invalid_entries: config.max_invalid_entries_per_window,
            max_invalid_messages: config.max_invalid_messages_per_window,
            quarantine_violation_threshold: config.quarantine_violation_threshold,
            quarantine_duration_ms: config.quarantine_duration.as_millis() as u64,
            peers: HashMap::new(),
        }
    }

    /// Record one invalid hash-database entry from `peer`. May push the
    /// peer into quarantine if this crosses the violation threshold.
    pub fn record_invalid_entry(&mut self, peer: &PeerId, now_ms: u64) {
        let window_ms = self.window_ms;
        let max_invalid_entries = self.max_invalid_entries;
        let quarantine_violation_threshold = self.quarantine_violation_threshold;
        let quarantine_duration_ms = self.quarantine_duration_ms;
        let state = self.peers.entry(peer.clone()).or_default();
        let cutoff = now_ms.saturating_sub(window_ms);
        evict_older_than(&mut state.invalid_entries, cutoff);
        state.invalid_entries.push_back(now_ms);
        if state.invalid_entries.len() as u32 > max_invalid_entries {
            state.violations = state.violations.saturating_add(1);
            tracing::debug!(%peer, violations = state.violations, "invalid-entry rate limit exceeded");
            if state.violations >= quarantine_violation_threshold {
                state.quarantined_until_ms = Some(now_ms + quarantine_duration_ms);
                tracing::warn!(%peer, until_ms = now_ms + quarantine_duration_ms, "peer quarantined");
            }
        }
    }

    /// Record one structurally invalid message from `peer`.
    pub fn record_invalid_message(&mut self, peer: &PeerId, now_ms: u64) {
        let window_ms = self.window_ms;
        let max_invalid_messages = self.max_invalid_messages;
        let quarantine_violation_threshold = self.quarantine_violation_threshold;
        let quarantine_duration_ms = self.quarantine_duration_ms;
        let state = self.peers.entry(peer.clone()).or_default();
        let cutoff = now_ms.saturating_sub(window_ms);
        evict_older_than(&mut state.invalid_messages, cutoff);
        state.invalid_messages.push_back(now_ms);
        if state.invalid_messages.len() as u32 > max_invalid_messages {
            state.violations = state.violations.saturating_add(1);
            tracing::debug!(%peer, violations = state.violations, "invalid-message rate limit exceeded");
            if state.violations >= quarantine_violation_threshold {
                state.quarantined_until_ms = Some(now_ms + quarantine_duration_ms);
                tracing::warn!(%peer, until_ms = now_ms + quarantine_duration_ms, "peer quarantined");
            }
        }
    }

    /// Reject if `peer` is currently quarantined; otherwise admit. Valid
    /// traffic from a non-quarantined peer is always admitted regardless of
    /// its violation count.
    pub fn check_admission(&self, peer: &PeerId, now_ms: u64) -> GossipResult<()> {
        if let Some(state) = self.peers.get(peer) {
            if let Some(until) = state.quarantined_until_ms {
                if now_ms < until {
                    return Err(GossipError::Quarantined {
                        quarantine_deadline_ms: until,
                    });
                }
            }
        }
        Ok(())
    }

    /// Current violation count for `peer` (0 if untracked).
    pub fn violations(&self, peer: &PeerId) -> u32 {
        self.peers.get(peer).map(|s| s.violations).unwrap_or(0)
    }

    /// Drop peers with no recent activity and no active quarantine, to
    /// bound memory.
    pub fn sweep(&mut self, now_ms: u64) {
        let cutoff = now_ms.saturating_sub(self.window_ms);
        for state in self.peers.values_mut() {
            evict_older_than(&mut state.invalid_entries, cutoff);
            evict_older_than(&mut state.invalid_messages, cutoff);
        }
        self.peers.retain(|_, state| {
            !state.invalid_entries.is_empty()
                || !state.invalid_messages.is_empty()
                || state
                    .quarantined_until_ms
                    .map(|until| until > now_ms)
                    .unwrap_or(false)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(seed: u8) -> PeerId {
        PeerId::from_public_key(&[seed; 32])
    }

    fn test_config() -> GossipConfig {
        let mut cfg = GossipConfig::default();
        cfg.max_invalid_entries_per_window = 50;
        cfg.max_invalid_messages_per_window = 10;
        cfg.quarantine_violation_threshold = 3;
        cfg.rate_limit_window = std::time::Duration::from_secs(5 * 60);
        cfg.quarantine_duration = std::time::Duration::from_secs(30 * 60);
        cfg
    }

    #[test]
    fn admits_traffic_from_an_untracked_peer() {
        let limiter = GossipRateLimiter::new(&test_config());
        assert!(limiter.check_admission(&peer(1), 0).is_ok());
    }

    #[test]
    fn invalid_messages_within_limit_do_not_quarantine() {
        let mut limiter = GossipRateLimiter::new(&test_config());
        let p = peer(1);
        for i in 0..10 {
            limiter.record_invalid_message(&p, i * 1000);
        }
        assert!(limiter.check_admission(&p, 10_000).is_ok());
        assert_eq!(limiter.violations(&p), 0);
    }

    #[test]
    fn exceeding_invalid_message_limit_counts_one_violation() {
        let mut limiter = GossipRateLimiter::new(&test_config());
        let p = peer(1);
        for i in 0..11 {
            limiter.record_invalid_message(&p, i * 1000);
        }
        assert_eq!(limiter.violations(&p), 1);
        // One violation is below the quarantine threshold of 3.
        assert!(limiter.check_admission(&p, 11_000).is_ok());
    }

    #[test]
    fn valid_traffic_is_still_accepted_after_violations_below_threshold() {
        let mut limiter = GossipRateLimiter::new(&test_config());
        let p = peer(1);
        for i in 0..11 {
            limiter.record_invalid_message(&p, i * 1000);
        }
        assert!(limiter.check_admission(&p, 12_000).is_ok());
    }

    #[test]
    fn three_violation_windows_trigger_quarantine() {
        let mut limiter = GossipRateLimiter::new(&test_config());
        let p = peer(1);
        let window_ms = 5 * 60 * 1000u64;
        for round in 0..3u64 {
            let base = round * window_ms * 2;
            for i in 0..11 {
                limiter.record_invalid_message(&p, base + i * 1000);
            }
        }
        assert_eq!(limiter.violations(&p), 3);
        let now = 2 * window_ms * 2;
        assert!(matches!(
            limiter.check_admission(&p, now),
            Err(GossipError::Quarantined { .. })
        ));
    }

    #[test]
    fn quarantine_expires_after_its_duration() {
        let mut limiter = GossipRateLimiter::new(&test_config());
        let p = peer(1);
        let window_ms = 5 * 60 * 1000u64;
        for round in 0..3u64 {
            let base = round * window_ms * 2;
            for i in 0..11 {
                limiter.record_invalid_message(&p, base + i * 1000);
            }
        }
        let quarantine_start = 2 * window_ms * 2 + 10_000;
        let quarantine_duration_ms = 30 * 60 * 1000u64;
        assert!(limiter
            .check_admission(&p, quarantine_start + quarantine_duration_ms + 1)
            .is_ok());
    }

    #[test]
    fn different_peers_are_tracked_independently() {
        let mut limiter = GossipRateLimiter::new(&test_config());
        for i in 0..11 {
            limiter.record_invalid_message(&peer(1), i * 1000);
        }
        assert_eq!(limiter.violations(&peer(1)), 1);
        assert_eq!(limiter.violations(&peer(2)), 0);
    }

    #[test]
    fn sweep_drops_idle_peers_with_no_active_quarantine() {
        let mut limiter = GossipRateLimiter::new(&test_config());
        limiter.record_invalid_message(&peer(1), 0);
        limiter.sweep(10 * 60 * 1000);
        assert!(limiter.check_admission(&peer(1), 10 * 60 * 1000).is_ok());
    }
}
