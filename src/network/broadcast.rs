//! Broadcast Scheduler
//!
//! Decides when a board snapshot is worth sending and builds it.
//! Snapshots are skipped only while nothing moves, the coarse signature is
//! unchanged and the board is not empty.

use chrono::Utc;

use crate::core::hash::{snapshot_signature, Signature};
use crate::game::entity::Piece;
use crate::game::physics::PhysicsWorld;
use crate::game::state::GameWorld;
use crate::network::protocol::{BlockUpdate, GameStateUpdate};

/// Epoch milliseconds.
pub fn server_time_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Round to `decimals` places.
#[inline]
pub fn quantize(value: f32, decimals: i32) -> f32 {
    let scale = 10f32.powi(decimals);
    (value * scale).round() / scale
}

/// Tracks the last sent signature.
#[derive(Debug, Default)]
pub struct BroadcastScheduler {
    last_signature: Option<Signature>,
    sent: u64,
    skipped: u64,
}

impl BroadcastScheduler {
    /// Fresh scheduler; the first check always broadcasts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a snapshot should go out now. Records the signature if so.
    pub fn should_broadcast<P: PhysicsWorld>(&mut self, world: &GameWorld<P>) -> bool {
        let signature = snapshot_signature(
            world.registry.len(),
            world.state.score,
            world.state.game_over,
        );
        let threshold = world.config.motion_threshold;
        let moving = world.registry.iter().any(|p| p.speed() > threshold);
        let unchanged = self.last_signature == Some(signature);

        if !moving && unchanged && !world.registry.is_empty() {
            self.skipped += 1;
            return false;
        }

        self.mark_sent(signature);
        true
    }

    /// Record a snapshot sent outside the regular schedule.
    pub fn note_sent<P: PhysicsWorld>(&mut self, world: &GameWorld<P>) {
        let signature = snapshot_signature(
            world.registry.len(),
            world.state.score,
            world.state.game_over,
        );
        self.mark_sent(signature);
    }

    /// Forget the last signature so the next check broadcasts.
    pub fn invalidate(&mut self) {
        self.last_signature = None;
    }

    /// Snapshots sent and skipped so far.
    pub fn stats(&self) -> (u64, u64) {
        (self.sent, self.skipped)
    }

    fn mark_sent(&mut self, signature: Signature) {
        self.last_signature = Some(signature);
        self.sent += 1;
    }
}

/// Wire form of one piece.
pub fn block_update<P: PhysicsWorld>(world: &GameWorld<P>, piece: &Piece) -> BlockUpdate {
    BlockUpdate {
        id: piece.id,
        x: quantize(piece.position.x, 1),
        y: quantize(piece.position.y, 1),
        vx: quantize(piece.velocity.x, 2),
        vy: quantize(piece.velocity.y, 2),
        radius: piece.radius,
        rotation: quantize(piece.rotation, 2),
        angular_velocity: quantize(piece.angular_velocity, 2),
        rank: piece.rank,
        display_hint: world.registry.ranks().get(piece.rank).image.to_string(),
    }
}

/// Full snapshot of the board and counters.
pub fn build_snapshot<P: PhysicsWorld>(world: &GameWorld<P>) -> GameStateUpdate {
    let state = &world.state;
    GameStateUpdate {
        blocks: world
            .registry
            .iter()
            .map(|piece| block_update(world, piece))
            .collect(),
        score: state.score,
        high_score: state.high_score,
        game_over: state.game_over,
        total_spawned: state.total_spawned,
        max_combo: state.max_combo,
        combo: state.combo,
        contributors: state.contributors.clone(),
        server_time: server_time_ms(),
    }
}
