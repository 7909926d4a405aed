//! Arena Session
//!
//! The server context: one arena, its players, and the broadcast schedule.
//! Owned by the game-loop task, so every handler runs to completion without
//! locks.

use std::time::Instant;

use serde::{Serialize, Deserialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::core::rng::SeededRng;
use crate::game::events::GameEventData;
use crate::game::physics::PhysicsWorld;
use crate::game::rank::Rank;
use crate::game::state::{GameWorld, PieceId, SessionId};
use crate::game::tick::{self, TickResult};
use crate::game::GameError;
use crate::network::broadcast::{build_snapshot, server_time_ms, BroadcastScheduler};
use crate::network::players::PlayerRegistry;
use crate::network::protocol::{
    ClientMessage, DropRequest, ErrorCode, FinalScore, FruitInfo, MergeNotice,
    NextFruitNotice, PongInfo, ServerError, ServerMessage,
};

/// Work sent to the game loop by connection tasks.
#[derive(Debug)]
pub enum GameCommand {
    /// New connection with its outgoing queue.
    Connect {
        /// Id assigned by the connection task.
        session: SessionId,
        /// Outgoing queue drained by the writer task.
        sender: mpsc::Sender<ServerMessage>,
    },
    /// Parsed client message.
    Message {
        /// Sender.
        session: SessionId,
        /// The message.
        message: ClientMessage,
    },
    /// Connection closed.
    Disconnect {
        /// Session that went away.
        session: SessionId,
    },
    /// Health probe.
    Health {
        /// Where to send the report.
        reply: oneshot::Sender<HealthReport>,
    },
}

/// Health endpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    /// Always "ok" while the loop answers.
    pub status: String,
    /// Connected sessions.
    pub players: usize,
    /// Live pieces.
    pub pieces: usize,
    /// Current score.
    pub score: u64,
    /// Game has ended.
    pub game_over: bool,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Session is not connected.
    #[error("Player not found")]
    PlayerNotFound,

    /// Game rejected the action.
    #[error(transparent)]
    Game(#[from] GameError),
}

impl SessionError {
    /// Wire error for the caller.
    pub fn to_server_error(&self) -> ServerError {
        let code = match self {
            SessionError::PlayerNotFound => ErrorCode::NotConnected,
            SessionError::Game(GameError::GameOver) => ErrorCode::GameOver,
            SessionError::Game(_) => ErrorCode::InternalError,
        };
        ServerError::new(code, self.to_string())
    }
}

/// One arena and everyone connected to it.
pub struct ArenaSession<P: PhysicsWorld> {
    world: GameWorld<P>,
    players: PlayerRegistry,
    scheduler: BroadcastScheduler,
}

impl<P: PhysicsWorld> ArenaSession<P> {
    /// Create a session around a world.
    pub fn new(world: GameWorld<P>, rng: SeededRng) -> Self {
        Self {
            world,
            players: PlayerRegistry::new(rng),
            scheduler: BroadcastScheduler::new(),
        }
    }

    /// The arena.
    pub fn world(&self) -> &GameWorld<P> {
        &self.world
    }

    /// Connected players.
    pub fn players(&self) -> &PlayerRegistry {
        &self.players
    }

    /// Snapshots sent and skipped so far.
    pub fn broadcast_stats(&self) -> (u64, u64) {
        self.scheduler.stats()
    }

    // =========================================================================
    // HANDLERS
    // =========================================================================

    /// Register a connection and bring it up to date.
    pub fn connect(&mut self, id: SessionId, sender: mpsc::Sender<ServerMessage>) {
        let next_piece = self.players.connect(id, sender).next_piece;
        info!("Session {} connected ({} online)", id, self.players.len());

        self.players
            .send_to(id, ServerMessage::GameState(build_snapshot(&self.world)));
        self.players.send_to(id, next_piece_message(next_piece));

        if self.world.state.game_over {
            self.players
                .send_to(id, ServerMessage::GameOver(self.final_score()));
        }
    }

    /// Drop the session's queued piece at `x`.
    ///
    /// Rejected without any state change once the game is over.
    pub fn drop_piece(
        &mut self,
        id: SessionId,
        request: DropRequest,
        now: Instant,
    ) -> Result<PieceId, SessionError> {
        if self.world.state.game_over {
            return Err(GameError::GameOver.into());
        }
        let (rank, next) = self
            .players
            .take_next(id)
            .ok_or(SessionError::PlayerNotFound)?;

        let contributor = self
            .world
            .state
            .record_contribution(request.player_name.as_deref());
        let piece = self.world.registry.spawn(rank, request.x, Some(id), now);
        self.world.state.total_spawned += 1;

        debug!(
            "Session {} ({}) dropped rank {} as {}",
            id,
            contributor,
            rank.get(),
            piece
        );

        if self.world.config.broadcast_on_drop {
            self.broadcast_snapshot();
        }
        self.players.send_to(id, next_piece_message(next));

        Ok(piece)
    }

    /// Start a new game for everyone.
    pub fn restart(&mut self) {
        self.world.restart();
        self.players.reseed_all();
        self.scheduler.invalidate();

        self.broadcast_snapshot();
        for session in self.players.iter() {
            session.send(next_piece_message(session.next_piece));
        }
    }

    /// Forget a connection. Its pieces and contributions stay.
    pub fn disconnect(&mut self, id: SessionId) {
        if self.players.disconnect(id).is_some() {
            info!("Session {} disconnected ({} online)", id, self.players.len());
        }
    }

    /// Dispatch one client message.
    pub fn handle_message(&mut self, id: SessionId, message: ClientMessage, now: Instant) {
        let result = match message {
            ClientMessage::DropFruit(request) => self.drop_piece(id, request, now).map(|_| ()),
            ClientMessage::Restart => {
                info!("Session {} requested restart", id);
                self.restart();
                Ok(())
            }
            ClientMessage::Ping { timestamp } => {
                self.players.send_to(
                    id,
                    ServerMessage::Pong(PongInfo {
                        timestamp,
                        server_time: server_time_ms(),
                    }),
                );
                Ok(())
            }
        };

        if let Err(e) = result {
            debug!("Rejected message from {}: {}", id, e);
            self.players
                .send_to(id, ServerMessage::Error(e.to_server_error()));
        }
    }

    /// Dispatch one command from a connection task.
    pub fn handle_command(&mut self, command: GameCommand, now: Instant) {
        match command {
            GameCommand::Connect { session, sender } => self.connect(session, sender),
            GameCommand::Message { session, message } => self.handle_message(session, message, now),
            GameCommand::Disconnect { session } => self.disconnect(session),
            GameCommand::Health { reply } => {
                let _ = reply.send(self.health());
            }
        }
    }

    // =========================================================================
    // CLOCKS
    // =========================================================================

    /// One simulation step, with its notifications.
    pub fn simulation_tick(&mut self, now: Instant) -> TickResult {
        let result = tick::tick(&mut self.world, now);

        for event in &result.events {
            match &event.data {
                GameEventData::PieceMerged { position, new_rank, points, combo, .. } => {
                    let notice = MergeNotice {
                        x: position.x,
                        y: position.y,
                        color_hint: self.world.registry.ranks().get(*new_rank).color.to_string(),
                        points: *points,
                        combo: *combo,
                        new_rank: *new_rank,
                    };
                    self.players.broadcast(&ServerMessage::Merge(notice));
                }
                GameEventData::GameOver { .. } => self.announce_game_over(),
                GameEventData::GameOverArmed { .. } | GameEventData::GameOverCancelled => {}
            }
        }

        if !result.stale.is_empty() {
            warn!("Tick {} skipped {} pieces without bodies", self.world.tick, result.stale.len());
        }

        result
    }

    /// Send a snapshot if anything changed. Returns whether one was sent.
    pub fn broadcast_tick(&mut self) -> bool {
        if !self.scheduler.should_broadcast(&self.world) {
            return false;
        }
        if !self.players.is_empty() {
            self.players
                .broadcast(&ServerMessage::GameState(build_snapshot(&self.world)));
        }
        true
    }

    /// Combo decay check.
    pub fn combo_decay_tick(&mut self, now: Instant) -> bool {
        tick::decay_combo(&mut self.world, now)
    }

    // =========================================================================
    // OUTPUT
    // =========================================================================

    /// Current health numbers.
    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: "ok".to_string(),
            players: self.players.len(),
            pieces: self.world.registry.len(),
            score: self.world.state.score,
            game_over: self.world.state.game_over,
        }
    }

    /// Tell every client the server is going away.
    pub fn shutdown(&self, reason: &str) {
        self.players.broadcast(&ServerMessage::Shutdown {
            reason: reason.to_string(),
        });
    }

    fn broadcast_snapshot(&mut self) {
        self.scheduler.note_sent(&self.world);
        self.players
            .broadcast(&ServerMessage::GameState(build_snapshot(&self.world)));
    }

    fn announce_game_over(&self) {
        let result = self.final_score();
        self.players.broadcast(&ServerMessage::GameOver(result));

        match self.players.recorder() {
            Some(recorder) => {
                self.players.send_to(recorder, ServerMessage::SaveHistory(result));
            }
            None => info!("Game over with nobody connected, result not recorded"),
        }
    }

    fn final_score(&self) -> FinalScore {
        FinalScore {
            score: self.world.state.score,
            high_score: self.world.state.high_score,
            max_combo: self.world.state.max_combo,
        }
    }
}

fn next_piece_message(rank: Rank) -> ServerMessage {
    ServerMessage::PersonalNextFruit(NextFruitNotice {
        next_fruit: FruitInfo::from(crate::game::rank::RankTable.get(rank)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::config::GameConfig;
    use crate::core::vec2::Vec2;
    use crate::game::entity::SpawnRequest;
    use crate::game::physics::scripted::ScriptedPhysics;
    use crate::game::physics::ArenaPhysics;

    type Inbox = mpsc::Receiver<ServerMessage>;

    fn session() -> ArenaSession<ScriptedPhysics> {
        let world = GameWorld::new(ScriptedPhysics::new(), GameConfig::default()).unwrap();
        ArenaSession::new(world, SeededRng::new(7))
    }

    fn join(session: &mut ArenaSession<ScriptedPhysics>, byte: u8) -> (SessionId, Inbox) {
        let id = SessionId::from_bytes([byte; 16]);
        let (tx, rx) = mpsc::channel(64);
        session.connect(id, tx);
        (id, rx)
    }

    fn drain(inbox: &mut Inbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = inbox.try_recv() {
            out.push(msg);
        }
        out
    }

    fn drop_at(x: f32) -> ClientMessage {
        ClientMessage::DropFruit(DropRequest { x, player_name: None })
    }

    fn end_game(session: &mut ArenaSession<ScriptedPhysics>) -> Instant {
        let spawned = Instant::now();
        session.world.registry.spawn_at(
            SpawnRequest {
                rank: Rank::new(5).unwrap(),
                position: Vec2::new(320.0, 40.0),
                velocity: Vec2::ZERO,
                owner: None,
            },
            spawned,
        );
        let t0 = spawned + Duration::from_secs(5);
        session.simulation_tick(t0);
        let deadline = t0 + session.world.config.game_over_grace;
        session.simulation_tick(deadline);
        assert!(session.world.state.game_over);
        deadline
    }

    #[test]
    fn test_connect_sends_snapshot_and_next_piece() {
        let mut session = session();
        let (_, mut inbox) = join(&mut session, 1);

        let msgs = drain(&mut inbox);
        assert_eq!(msgs.len(), 2);
        assert!(matches!(msgs[0], ServerMessage::GameState(_)));
        let ServerMessage::PersonalNextFruit(notice) = &msgs[1] else {
            panic!("expected next piece");
        };
        assert!(notice.next_fruit.rank.get() <= 5);
    }

    #[test]
    fn test_drop_spawns_and_notifies() {
        let mut session = session();
        let (a, mut inbox_a) = join(&mut session, 1);
        let (_, mut inbox_b) = join(&mut session, 2);
        drain(&mut inbox_a);
        drain(&mut inbox_b);

        let queued = session.players().get(a).unwrap().next_piece;
        session.handle_message(
            a,
            ClientMessage::DropFruit(DropRequest { x: 150.0, player_name: Some(" pip ".into()) }),
            Instant::now(),
        );

        assert_eq!(session.world().registry.len(), 1);
        let piece = session.world().registry.iter().next().unwrap();
        assert_eq!(piece.rank, queued);
        assert_eq!(piece.owner, Some(a));
        assert_eq!(session.world().state.total_spawned, 1);
        assert_eq!(session.world().state.contributors["pip"], 1);

        let to_a = drain(&mut inbox_a);
        assert!(matches!(to_a[0], ServerMessage::GameState(_)));
        assert!(matches!(to_a[1], ServerMessage::PersonalNextFruit(_)));
        let to_b = drain(&mut inbox_b);
        assert_eq!(to_b.len(), 1);
        assert!(matches!(to_b[0], ServerMessage::GameState(_)));
    }

    #[test]
    fn test_scenario_drop_after_game_over_is_rejected() {
        let mut session = session();
        let (a, mut inbox) = join(&mut session, 1);
        let now = end_game(&mut session);
        drain(&mut inbox);

        let pieces = session.world().registry.len();
        let spawned = session.world().state.total_spawned;
        session.handle_message(a, drop_at(100.0), now);

        assert_eq!(session.world().registry.len(), pieces);
        assert_eq!(session.world().state.total_spawned, spawned);
        assert!(session.world().state.contributors.is_empty());

        let msgs = drain(&mut inbox);
        assert_eq!(msgs.len(), 1);
        let ServerMessage::Error(error) = &msgs[0] else {
            panic!("expected error");
        };
        assert_eq!(error.code, ErrorCode::GameOver);
    }

    #[test]
    fn test_game_over_reaches_all_and_recorder_saves() {
        let mut session = session();
        let (a, mut inbox_a) = join(&mut session, 1);
        let (_, mut inbox_b) = join(&mut session, 2);
        assert!(session.players().is_recorder(a));

        end_game(&mut session);

        let to_a = drain(&mut inbox_a);
        let to_b = drain(&mut inbox_b);
        assert!(to_a.iter().any(|m| matches!(m, ServerMessage::GameOver(_))));
        assert!(to_a.iter().any(|m| matches!(m, ServerMessage::SaveHistory(_))));
        assert!(to_b.iter().any(|m| matches!(m, ServerMessage::GameOver(_))));
        assert!(!to_b.iter().any(|m| matches!(m, ServerMessage::SaveHistory(_))));

        // Late joiners hear about it too
        let (_, mut inbox_c) = join(&mut session, 3);
        let to_c = drain(&mut inbox_c);
        assert!(matches!(to_c.last(), Some(ServerMessage::GameOver(_))));
    }

    #[test]
    fn test_restart_resets_and_reseeds() {
        let mut session = session();
        let (a, mut inbox) = join(&mut session, 1);
        session.handle_message(a, drop_at(100.0), Instant::now());
        session.world.state.score = 500;
        session.world.state.high_score = 500;
        end_game(&mut session);
        drain(&mut inbox);

        session.handle_message(a, ClientMessage::Restart, Instant::now());

        assert!(session.world().registry.is_empty());
        assert_eq!(session.world().state.score, 0);
        assert_eq!(session.world().state.high_score, 500);
        assert!(!session.world().state.game_over);
        assert_eq!(session.world().state.contributors["Anonymous"], 1);

        let msgs = drain(&mut inbox);
        let ServerMessage::GameState(snapshot) = &msgs[0] else {
            panic!("expected snapshot");
        };
        assert!(snapshot.blocks.is_empty());
        assert!(matches!(msgs[1], ServerMessage::PersonalNextFruit(_)));

        // Drops work again
        session.handle_message(a, drop_at(100.0), Instant::now());
        assert_eq!(session.world().registry.len(), 1);
    }

    #[test]
    fn test_merge_notice_broadcast() {
        let mut session = session();
        let (_, mut inbox) = join(&mut session, 1);
        drain(&mut inbox);
        let now = Instant::now();
        for _ in 0..2 {
            session.world.registry.spawn_at(
                SpawnRequest {
                    rank: Rank::MIN,
                    position: Vec2::new(200.0, 500.0),
                    velocity: Vec2::ZERO,
                    owner: None,
                },
                now,
            );
        }

        session.simulation_tick(now);

        let msgs = drain(&mut inbox);
        let ServerMessage::Merge(notice) = &msgs[0] else {
            panic!("expected merge");
        };
        assert_eq!(notice.points, 40);
        assert_eq!(notice.combo, 1);
        assert_eq!(notice.new_rank.get(), 2);
        assert_eq!(notice.color_hint, "#ff4f5e");
    }

    #[test]
    fn test_disconnect_keeps_pieces() {
        let mut session = session();
        let (a, _inbox) = join(&mut session, 1);
        session.handle_message(a, drop_at(100.0), Instant::now());

        session.disconnect(a);

        assert!(session.players().is_empty());
        assert_eq!(session.players().recorder(), None);
        assert_eq!(session.world().registry.len(), 1);
        assert_eq!(session.world().state.contributors["Anonymous"], 1);
    }

    #[test]
    fn test_unknown_session_drop_is_rejected() {
        let mut session = session();
        let ghost = SessionId::from_bytes([9; 16]);
        let err = session
            .drop_piece(ghost, DropRequest { x: 1.0, player_name: None }, Instant::now())
            .unwrap_err();
        assert_eq!(err, SessionError::PlayerNotFound);
        assert!(session.world().registry.is_empty());
    }

    #[test]
    fn test_ping_gets_pong() {
        let mut session = session();
        let (a, mut inbox) = join(&mut session, 1);
        drain(&mut inbox);

        session.handle_message(a, ClientMessage::Ping { timestamp: 42 }, Instant::now());

        let msgs = drain(&mut inbox);
        assert!(matches!(msgs[0], ServerMessage::Pong(PongInfo { timestamp: 42, .. })));
    }

    #[tokio::test]
    async fn test_health_command() {
        let mut session = session();
        let (a, _inbox) = join(&mut session, 1);
        session.handle_message(a, drop_at(100.0), Instant::now());

        let (reply, rx) = oneshot::channel();
        session.handle_command(GameCommand::Health { reply }, Instant::now());
        let report = rx.await.unwrap();

        assert_eq!(report.status, "ok");
        assert_eq!(report.players, 1);
        assert_eq!(report.pieces, 1);
        assert!(!report.game_over);
    }

    #[test]
    fn test_broadcast_tick_skips_still_board() {
        let mut session = session();
        let (a, mut inbox) = join(&mut session, 1);
        session.handle_message(a, drop_at(100.0), Instant::now());
        drain(&mut inbox);

        // Post-drop snapshot already covered this board
        assert!(!session.broadcast_tick());
        session.world.state.score += 10;
        assert!(session.broadcast_tick());
        assert!(matches!(drain(&mut inbox)[0], ServerMessage::GameState(_)));
    }

    #[test]
    fn test_settled_rapier_board_stops_broadcasting() {
        let config = GameConfig::default();
        let physics = ArenaPhysics::new(config.arena.gravity);
        let world = GameWorld::new(physics, config).unwrap();
        let mut session = ArenaSession::new(world, SeededRng::new(11));
        let id = SessionId::from_bytes([1; 16]);
        let (tx, mut inbox) = mpsc::channel(1024);
        session.connect(id, tx);

        let step = session.world().config.tick_duration();
        let mut now = Instant::now();
        let run = |session: &mut ArenaSession<ArenaPhysics>, ticks: u32, now: &mut Instant| {
            let mut sent = 0;
            for i in 0..ticks {
                *now += step;
                session.simulation_tick(*now);
                if i % 2 == 0 && session.broadcast_tick() {
                    sent += 1;
                }
            }
            sent
        };

        session.world.registry.spawn(Rank::MIN, 200.0, None, now);
        run(&mut session, 120, &mut now);
        session.world.registry.spawn(Rank::MIN, 200.0, None, now);
        run(&mut session, 480, &mut now);

        assert_eq!(session.world().registry.len(), 1);
        assert_eq!(session.world().state.score, 40);
        assert!(drain(&mut inbox).iter().any(|m| matches!(m, ServerMessage::Merge(_))));

        // The merged piece is asleep; a further second sends nothing
        assert_eq!(run(&mut session, 60, &mut now), 0);
        assert!(!session.broadcast_tick());
        assert!(session.broadcast_stats().1 >= 31);
    }
}
