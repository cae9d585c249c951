// Copyright (c) 2024 Mesh Overlay Contributors

//! Per-peer delta-sync state machine (§4.6): `Idle -> Greeting ->
//! Delivering -> Settling -> Cooldown -> Idle`.

use crate::error::GossipError;

/// A peer's position in the delta-sync cycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SyncState {
    /// No sync in progress; eligible to start one once past cooldown.
    Idle,
    /// `HELLO` exchanged; about to request a delta.
    Greeting,
    /// Awaiting or receiving `PUSHDELTA` entries.
    Delivering,
    /// Validating and merging received entries; about to `ACK`.
    Settling,
    /// Refusing further syncs with this peer until the cooldown deadline.
    Cooldown,
}

impl SyncState {
    fn label(self) -> &'static str {
        match self {
            SyncState::Idle => "Idle",
            SyncState::Greeting => "Greeting",
            SyncState::Delivering => "Delivering",
            SyncState::Settling => "Settling",
            SyncState::Cooldown => "Cooldown",
        }
    }

    fn allowed_next(self, next: SyncState) -> bool {
        // Any state may abort back to Idle: a stalled handshake (stuck in
        // Greeting/Delivering/Settling with no follow-up) or an expired
        // Cooldown both self-heal this way rather than pinning a peer in a
        // non-Idle state for the rest of the node's lifetime.
        if next == SyncState::Idle {
            return true;
        }
        matches!(
            (self, next),
            (SyncState::Idle, SyncState::Greeting)
                | (SyncState::Greeting, SyncState::Delivering)
                | (SyncState::Delivering, SyncState::Settling)
                | (SyncState::Settling, SyncState::Cooldown)
        )
    }

    /// Attempt to move to `next`, rejecting any transition outside the
    /// linear cycle.
    pub fn transition(self, next: SyncState) -> Result<SyncState, GossipError> {
        if self.allowed_next(next) {
            Ok(next)
        } else {
            Err(GossipError::InvalidSyncTransition {
                from: self.label(),
                to: next.label(),
            })
        }
    }
}

/// Per-peer sync bookkeeping: current state plus the watermark needed to
/// compute `SinceSeqId` for the next `REQDELTA`.
#[derive(Clone, Copy, Debug)]
pub struct PeerSyncTracker {
    state: SyncState,
    last_observed_seq_id: i64,
    cooldown_deadline_ms: Option<u64>,
    entered_state_at_ms: u64,
}

impl PeerSyncTracker {
    /// Build a fresh tracker with no prior sync history.
    pub fn new() -> Self {
        Self {
            state: SyncState::Idle,
            last_observed_seq_id: -1,
            cooldown_deadline_ms: None,
            entered_state_at_ms: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Whether a new sync cycle may start. `Idle` always qualifies. A
    /// `Cooldown` past its deadline, or any other non-`Idle` state held for
    /// at least `stall_timeout_ms` (the peer vanished mid-handshake and
    /// never drove the cycle to completion), self-heals back to `Idle` and
    /// also qualifies. This is what keeps a peer sync-eligible more than
    /// once over the node's lifetime: without it, a tracker that reaches
    /// `Cooldown` or gets stuck in `Greeting` would stay non-`Idle` forever.
    pub fn eligible_to_start(&mut self, now_ms: u64, stall_timeout_ms: u64) -> bool {
        match self.state {
            SyncState::Idle => true,
            SyncState::Cooldown => {
                let expired = self.cooldown_deadline_ms.map(|deadline| now_ms >= deadline).unwrap_or(true);
                if expired {
                    let _ = self.advance(SyncState::Idle, now_ms, None);
                }
                expired
            }
            _ => {
                let stalled = now_ms.saturating_sub(self.entered_state_at_ms) >= stall_timeout_ms;
                if stalled {
                    let _ = self.advance(SyncState::Idle, now_ms, None);
                }
                stalled
            }
        }
    }

    /// Advance to `next`, recording `cooldown_until_ms` as the deadline when
    /// entering `Cooldown`.
    pub fn advance(&mut self, next: SyncState, now_ms: u64, cooldown_until_ms: Option<u64>) -> Result<(), GossipError> {
        self.state = self.state.transition(next)?;
        self.entered_state_at_ms = now_ms;
        self.cooldown_deadline_ms = if next == SyncState::Cooldown { cooldown_until_ms } else { None };
        Ok(())
    }

    /// Record the highest `SeqId` observed from this peer so far.
    pub fn record_observed_seq_id(&mut self, seq_id: i64) {
        if seq_id > self.last_observed_seq_id {
            self.last_observed_seq_id = seq_id;
        }
    }

    /// The watermark to send as `SinceSeqId` in the next `REQDELTA`.
    pub fn since_seq_id(&self) -> i64 {
        self.last_observed_seq_id
    }
}

impl Default for PeerSyncTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_cycle_is_allowed() {
        let mut tracker = PeerSyncTracker::new();
        tracker.advance(SyncState::Greeting, 0, None).unwrap();
        tracker.advance(SyncState::Delivering, 0, None).unwrap();
        tracker.advance(SyncState::Settling, 0, None).unwrap();
        tracker.advance(SyncState::Cooldown, 0, Some(1_800_000)).unwrap();
        tracker.advance(SyncState::Idle, 1_800_000, None).unwrap();
        assert_eq!(tracker.state(), SyncState::Idle);
    }

    #[test]
    fn skipping_a_stage_is_rejected() {
        let mut tracker = PeerSyncTracker::new();
        assert!(tracker.advance(SyncState::Delivering, 0, None).is_err());
    }

    #[test]
    fn fresh_tracker_is_eligible_immediately() {
        let mut tracker = PeerSyncTracker::new();
        assert!(tracker.eligible_to_start(0, 15_000));
    }

    #[test]
    fn cooldown_blocks_new_syncs_until_deadline() {
        let mut tracker = PeerSyncTracker::new();
        tracker.advance(SyncState::Greeting, 0, None).unwrap();
        tracker.advance(SyncState::Delivering, 0, None).unwrap();
        tracker.advance(SyncState::Settling, 0, None).unwrap();
        tracker.advance(SyncState::Cooldown, 0, Some(1_800_000)).unwrap();
        assert!(!tracker.eligible_to_start(0, 15_000));
        assert!(!tracker.eligible_to_start(1_799_999, 15_000));
    }

    #[test]
    fn cooldown_past_its_deadline_self_heals_to_idle_and_is_eligible() {
        let mut tracker = PeerSyncTracker::new();
        tracker.advance(SyncState::Greeting, 0, None).unwrap();
        tracker.advance(SyncState::Delivering, 0, None).unwrap();
        tracker.advance(SyncState::Settling, 0, None).unwrap();
        tracker.advance(SyncState::Cooldown, 0, Some(1_800_000)).unwrap();
        assert!(tracker.eligible_to_start(1_800_000, 15_000));
        assert_eq!(tracker.state(), SyncState::Idle);
    }

    #[test]
    fn a_handshake_stuck_in_greeting_self_heals_after_the_stall_timeout() {
        let mut tracker = PeerSyncTracker::new();
        tracker.advance(SyncState::Greeting, 1_000, None).unwrap();
        assert!(!tracker.eligible_to_start(5_000, 15_000));
        assert_eq!(tracker.state(), SyncState::Greeting);
        assert!(tracker.eligible_to_start(16_001, 15_000));
        assert_eq!(tracker.state(), SyncState::Idle);
    }

    #[test]
    fn watermark_tracks_the_highest_seen_seq_id() {
        let mut tracker = PeerSyncTracker::new();
        tracker.record_observed_seq_id(10);
        tracker.record_observed_seq_id(5);
        tracker.record_observed_seq_id(20);
        assert_eq!(tracker.since_seq_id(), 20);
    }
}
