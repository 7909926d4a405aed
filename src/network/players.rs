//! Player Sessions
//!
//! Connected players, their personal next-piece queue, and the single
//! history recorder that persists final results.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::rng::SeededRng;
use crate::game::rank::{Rank, DROP_WEIGHTS};
use crate::game::state::SessionId;
use crate::network::protocol::ServerMessage;

/// One connected player.
#[derive(Debug)]
pub struct PlayerSession {
    /// Session id.
    pub id: SessionId,
    /// Piece this player drops next.
    pub next_piece: Rank,
    /// Outgoing message queue.
    sender: mpsc::Sender<ServerMessage>,
}

impl PlayerSession {
    /// Queue a message without waiting. A full or closed queue drops it.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.sender.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                debug!("Dropping message for {}: {}", self.id, e);
                false
            }
        }
    }
}

/// Draw a piece rank from the weighted low-rank distribution.
pub fn draw_next_piece(rng: &mut SeededRng) -> Rank {
    let index = rng.weighted_index(&DROP_WEIGHTS).unwrap_or(0);
    Rank::new(index as u8 + 1).unwrap_or(Rank::MIN)
}

/// Registry of connected sessions.
#[derive(Debug)]
pub struct PlayerRegistry {
    sessions: BTreeMap<SessionId, PlayerSession>,
    recorder: Option<SessionId>,
    rng: SeededRng,
}

impl PlayerRegistry {
    /// Empty registry drawing pieces from `rng`.
    pub fn new(rng: SeededRng) -> Self {
        Self {
            sessions: BTreeMap::new(),
            recorder: None,
            rng,
        }
    }

    /// Register a session and draw its first piece.
    ///
    /// The first session to arrive while nobody records becomes the recorder.
    pub fn connect(&mut self, id: SessionId, sender: mpsc::Sender<ServerMessage>) -> &PlayerSession {
        let next_piece = draw_next_piece(&mut self.rng);

        if self.recorder.is_none() {
            self.recorder = Some(id);
            info!("Session {} is now the history recorder", id);
        }

        self.sessions
            .entry(id)
            .or_insert(PlayerSession { id, next_piece, sender })
    }

    /// Remove a session, handing the recorder role on if needed.
    pub fn disconnect(&mut self, id: SessionId) -> Option<PlayerSession> {
        let session = self.sessions.remove(&id)?;

        if self.recorder == Some(id) {
            self.recorder = self.sessions.keys().next().copied();
            match self.recorder {
                Some(next) => info!("History recorder reassigned to {}", next),
                None => info!("No sessions left, history recorder cleared"),
            }
        }

        Some(session)
    }

    /// Take a session's queued piece and draw its replacement.
    ///
    /// Returns `(dropped, next)`.
    pub fn take_next(&mut self, id: SessionId) -> Option<(Rank, Rank)> {
        let session = self.sessions.get_mut(&id)?;
        let dropped = session.next_piece;
        session.next_piece = draw_next_piece(&mut self.rng);
        Some((dropped, session.next_piece))
    }

    /// Give every session a freshly drawn piece.
    pub fn reseed_all(&mut self) {
        for session in self.sessions.values_mut() {
            session.next_piece = draw_next_piece(&mut self.rng);
        }
    }

    /// Current history recorder.
    pub fn recorder(&self) -> Option<SessionId> {
        self.recorder
    }

    /// Whether `id` is the recorder.
    pub fn is_recorder(&self, id: SessionId) -> bool {
        self.recorder == Some(id)
    }

    /// Look up a session.
    pub fn get(&self, id: SessionId) -> Option<&PlayerSession> {
        self.sessions.get(&id)
    }

    /// Send to one session.
    pub fn send_to(&self, id: SessionId, msg: ServerMessage) -> bool {
        self.sessions.get(&id).is_some_and(|s| s.send(msg))
    }

    /// Send to everyone. Returns how many queues accepted it.
    pub fn broadcast(&self, msg: &ServerMessage) -> usize {
        self.sessions
            .values()
            .filter(|s| s.send(msg.clone()))
            .count()
    }

    /// Sessions in id order.
    pub fn iter(&self) -> impl Iterator<Item = &PlayerSession> {
        self.sessions.values()
    }

    /// Number of connected sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::rank::DROPPABLE_RANKS;

    fn channel() -> (mpsc::Sender<ServerMessage>, mpsc::Receiver<ServerMessage>) {
        mpsc::channel(16)
    }

    #[test]
    fn test_first_session_becomes_recorder() {
        let mut players = PlayerRegistry::new(SeededRng::new(1));
        let a = SessionId::from_bytes([1; 16]);
        let b = SessionId::from_bytes([2; 16]);

        players.connect(a, channel().0);
        players.connect(b, channel().0);

        assert_eq!(players.recorder(), Some(a));
        assert!(!players.is_recorder(b));
        assert_eq!(players.len(), 2);
    }

    #[test]
    fn test_recorder_reassigned_on_disconnect() {
        let mut players = PlayerRegistry::new(SeededRng::new(1));
        let a = SessionId::from_bytes([1; 16]);
        let b = SessionId::from_bytes([2; 16]);
        players.connect(a, channel().0);
        players.connect(b, channel().0);

        players.disconnect(a);
        assert_eq!(players.recorder(), Some(b));

        // Non-recorder leaving changes nothing
        let c = SessionId::from_bytes([3; 16]);
        players.connect(c, channel().0);
        players.disconnect(c);
        assert_eq!(players.recorder(), Some(b));
    }

    #[test]
    fn test_scenario_sole_session_leaves() {
        let mut players = PlayerRegistry::new(SeededRng::new(1));
        let a = SessionId::from_bytes([1; 16]);
        players.connect(a, channel().0);

        players.disconnect(a);
        assert_eq!(players.recorder(), None);
        assert!(players.is_empty());

        let b = SessionId::from_bytes([2; 16]);
        players.connect(b, channel().0);
        assert_eq!(players.recorder(), Some(b));
    }

    #[test]
    fn test_draws_stay_in_droppable_ranks() {
        let mut rng = SeededRng::new(99);
        let mut seen = [0u32; DROPPABLE_RANKS];
        for _ in 0..2000 {
            let rank = draw_next_piece(&mut rng).get() as usize;
            assert!((1..=DROPPABLE_RANKS).contains(&rank));
            seen[rank - 1] += 1;
        }
        // Most likely rank is the smallest, rarest the largest
        assert!(seen[0] > seen[4]);
        assert!(seen.iter().all(|&n| n > 0));
    }

    #[test]
    fn test_take_next_draws_replacement() {
        let mut players = PlayerRegistry::new(SeededRng::new(5));
        let a = SessionId::from_bytes([1; 16]);
        let queued = players.connect(a, channel().0).next_piece;

        let (dropped, next) = players.take_next(a).unwrap();
        assert_eq!(dropped, queued);
        assert_eq!(players.get(a).unwrap().next_piece, next);
        assert!(players.take_next(SessionId::from_bytes([9; 16])).is_none());
    }

    #[test]
    fn test_broadcast_and_full_queue() {
        let mut players = PlayerRegistry::new(SeededRng::new(1));
        let a = SessionId::from_bytes([1; 16]);
        let (tx, mut rx) = mpsc::channel(1);
        players.connect(a, tx);

        let msg = ServerMessage::Shutdown { reason: "bye".to_string() };
        assert_eq!(players.broadcast(&msg), 1);
        // Queue of one is now full
        assert_eq!(players.broadcast(&msg), 0);

        assert!(matches!(rx.try_recv(), Ok(ServerMessage::Shutdown { .. })));
        assert!(players.send_to(a, msg));
    }
}
