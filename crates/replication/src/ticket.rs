//! Ticket state machines.
//!
//! Tickets are plain values with no timers or I/O of their own; the
//! [`ReplicationService`](crate::ReplicationService) arms their windows and
//! sends their messages.

use std::{collections::BTreeSet, time::Duration};

use bytes::Bytes;
use cairn_primitives::{ChunkKey, PeerId, ReplicationDegree};

use crate::{Backoff, ReplicationConfig};

/// What to do when a ticket's window closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowOutcome {
    /// Desired degree reached.
    Satisfied,
    /// Send again and wait for the given window.
    Retry(Duration),
    /// Retry budget spent.
    Exhausted,
}

/// Where a backup ticket is in its confirmation cycle.
///
/// `Sent` -> `AwaitingConfirmation` -> `WindowClosed`, then back to `Sent`
/// for a retry, or to one of the final states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketState {
    /// Message pushed, window not armed yet.
    Sent,
    /// Window armed, counting confirmations.
    AwaitingConfirmation,
    /// Window over, outcome being evaluated.
    WindowClosed,
    Satisfied,
    Exhausted,
}

impl TicketState {
    /// Whether the ticket has reached a final state.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Satisfied | Self::Exhausted)
    }
}

/// Final state of a backup ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplicationStatus {
    Satisfied,
    Exhausted,
}

/// Result of backing up one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicationOutcome {
    pub key: ChunkKey,
    pub status: ReplicationStatus,
    pub desired: ReplicationDegree,
    /// Distinct peers that confirmed storing the chunk.
    pub actual: ReplicationDegree,
    /// Times the chunk was pushed.
    pub sends: u32,
}

impl ReplicationOutcome {
    pub fn is_satisfied(&self) -> bool {
        self.status == ReplicationStatus::Satisfied
    }
}

/// Tracks confirmations for one pushed chunk.
///
/// The ticket only evaluates its savers when the window closes: a chunk that
/// reaches its desired degree early still waits out the window, which lets
/// late confirmations be counted before the outcome is reported.
#[derive(Debug, Clone)]
pub struct BackupTicket {
    key: ChunkKey,
    state: TicketState,
    desired: ReplicationDegree,
    savers: BTreeSet<PeerId>,
    backoff: Backoff,
    payload: Bytes,
}

impl BackupTicket {
    /// Ticket for an encoded `PUTCHUNK` about to be pushed.
    pub fn new(
        key: ChunkKey,
        desired: ReplicationDegree,
        payload: Bytes,
        config: &ReplicationConfig,
    ) -> Self {
        Self {
            key,
            state: TicketState::Sent,
            desired,
            savers: BTreeSet::new(),
            backoff: Backoff::new(config),
            payload,
        }
    }

    pub fn key(&self) -> &ChunkKey {
        &self.key
    }

    pub fn state(&self) -> TicketState {
        self.state
    }

    /// The push went out and its window is armed.
    pub fn armed(&mut self) {
        if self.state == TicketState::Sent {
            self.state = TicketState::AwaitingConfirmation;
        }
    }

    /// Encoded message to push on every attempt.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn window(&self) -> Duration {
        self.backoff.window()
    }

    pub fn attempt(&self) -> u32 {
        self.backoff.attempt()
    }

    /// Distinct peers that confirmed so far.
    pub fn actual(&self) -> ReplicationDegree {
        ReplicationDegree::try_from(self.savers.len()).unwrap_or(ReplicationDegree::MAX)
    }

    pub fn savers(&self) -> impl Iterator<Item = &PeerId> {
        self.savers.iter()
    }

    /// Count a confirmation. Returns `false` for a peer already counted and
    /// for a ticket already in a final state.
    pub fn record_saver(&mut self, peer: PeerId) -> bool {
        !self.state.is_final() && self.savers.insert(peer)
    }

    /// Evaluate the ticket at the end of its current window.
    ///
    /// A retry leaves the ticket in [`TicketState::Sent`] until the service
    /// pushes again and re-arms it.
    pub fn on_window_closed(&mut self) -> WindowOutcome {
        self.state = TicketState::WindowClosed;
        let outcome = if self.actual() >= self.desired {
            WindowOutcome::Satisfied
        } else {
            match self.backoff.advance() {
                Some(window) => WindowOutcome::Retry(window),
                None => WindowOutcome::Exhausted,
            }
        };
        self.state = match outcome {
            WindowOutcome::Satisfied => TicketState::Satisfied,
            WindowOutcome::Retry(_) => TicketState::Sent,
            WindowOutcome::Exhausted => TicketState::Exhausted,
        };
        outcome
    }

    /// Final report, given how the ticket ended.
    pub fn outcome(&self, status: ReplicationStatus) -> ReplicationOutcome {
        ReplicationOutcome {
            key: self.key.clone(),
            status,
            desired: self.desired,
            actual: self.actual(),
            sends: self.backoff.sends(),
        }
    }
}

/// Tracks one outstanding `GETCHUNK`.
///
/// Completes on the first matching `CHUNK`; the service drops the ticket at
/// that point, so only window expiries reach [`on_window_closed`](Self::on_window_closed).
#[derive(Debug, Clone)]
pub struct RestoreTicket {
    key: ChunkKey,
    backoff: Backoff,
    payload: Bytes,
}

impl RestoreTicket {
    pub fn new(key: ChunkKey, payload: Bytes, config: &ReplicationConfig) -> Self {
        Self {
            key,
            backoff: Backoff::new(config),
            payload,
        }
    }

    pub fn key(&self) -> &ChunkKey {
        &self.key
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn window(&self) -> Duration {
        self.backoff.window()
    }

    pub fn sends(&self) -> u32 {
        self.backoff.sends()
    }

    /// No chunk arrived in time: ask again or give up.
    pub fn on_window_closed(&mut self) -> WindowOutcome {
        match self.backoff.advance() {
            Some(window) => WindowOutcome::Retry(window),
            None => WindowOutcome::Exhausted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_primitives::FileId;

    fn key() -> ChunkKey {
        ChunkKey::new(FileId::from_digest([7; 32]), 0)
    }

    fn peer(id: &str) -> PeerId {
        PeerId::new(id).unwrap()
    }

    fn ticket(desired: ReplicationDegree) -> BackupTicket {
        BackupTicket::new(key(), desired, Bytes::new(), &ReplicationConfig::default())
    }

    #[test]
    fn test_duplicate_confirmations_counted_once() {
        let mut ticket = ticket(3);
        assert!(ticket.record_saver(peer("a")));
        assert!(!ticket.record_saver(peer("a")));
        assert!(ticket.record_saver(peer("b")));
        assert_eq!(ticket.actual(), 2);
        assert_eq!(ticket.savers().count(), 2);
    }

    #[test]
    fn test_satisfied_on_first_window() {
        let mut ticket = ticket(2);
        ticket.record_saver(peer("a"));
        ticket.record_saver(peer("b"));
        assert_eq!(ticket.on_window_closed(), WindowOutcome::Satisfied);

        let outcome = ticket.outcome(ReplicationStatus::Satisfied);
        assert!(outcome.is_satisfied());
        assert_eq!(outcome.actual, 2);
        assert_eq!(outcome.sends, 1);
    }

    #[test]
    fn test_exceeding_desired_is_satisfied() {
        let mut ticket = ticket(1);
        ticket.record_saver(peer("a"));
        ticket.record_saver(peer("b"));
        assert_eq!(ticket.on_window_closed(), WindowOutcome::Satisfied);
    }

    #[test]
    fn test_retries_then_exhausts() {
        let mut ticket = ticket(2);
        ticket.record_saver(peer("a"));

        let mut windows = Vec::new();
        loop {
            match ticket.on_window_closed() {
                WindowOutcome::Retry(window) => {
                    assert_eq!(window, ticket.window());
                    windows.push(window.as_millis());
                }
                WindowOutcome::Exhausted => break,
                WindowOutcome::Satisfied => panic!("one saver cannot satisfy degree 2"),
            }
        }
        assert_eq!(windows, vec![2000, 4000, 8000, 16000]);

        let outcome = ticket.outcome(ReplicationStatus::Exhausted);
        assert_eq!(outcome.sends, 5);
        assert_eq!(outcome.actual, 1);
    }

    #[test]
    fn test_late_saver_counts_on_retry() {
        let mut ticket = ticket(2);
        ticket.record_saver(peer("a"));
        assert!(matches!(ticket.on_window_closed(), WindowOutcome::Retry(_)));
        ticket.record_saver(peer("b"));
        assert_eq!(ticket.on_window_closed(), WindowOutcome::Satisfied);
        assert_eq!(ticket.outcome(ReplicationStatus::Satisfied).sends, 2);
    }

    #[test]
    fn test_state_follows_windows() {
        let mut ticket = ticket(2);
        assert_eq!(ticket.state(), TicketState::Sent);
        ticket.armed();
        assert_eq!(ticket.state(), TicketState::AwaitingConfirmation);

        ticket.record_saver(peer("a"));
        assert!(matches!(ticket.on_window_closed(), WindowOutcome::Retry(_)));
        assert_eq!(ticket.state(), TicketState::Sent);
        ticket.armed();

        ticket.record_saver(peer("b"));
        assert_eq!(ticket.on_window_closed(), WindowOutcome::Satisfied);
        assert_eq!(ticket.state(), TicketState::Satisfied);

        // Final tickets take no more savers.
        assert!(!ticket.record_saver(peer("c")));
        assert_eq!(ticket.actual(), 2);
    }

    #[test]
    fn test_state_exhausted() {
        let config = ReplicationConfig::default().with_max_attempts(0);
        let mut ticket = BackupTicket::new(key(), 1, Bytes::new(), &config);
        ticket.armed();
        assert_eq!(ticket.on_window_closed(), WindowOutcome::Exhausted);
        assert_eq!(ticket.state(), TicketState::Exhausted);
        assert!(ticket.state().is_final());
    }

    #[test]
    fn test_restore_ticket_budget() {
        let mut ticket = RestoreTicket::new(key(), Bytes::new(), &ReplicationConfig::default());
        let retries = std::iter::from_fn(|| match ticket.on_window_closed() {
            WindowOutcome::Retry(w) => Some(w),
            _ => None,
        })
        .count();
        assert_eq!(retries, 4);
        assert_eq!(ticket.sends(), 5);
    }
}
