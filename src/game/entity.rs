//! Entity Registry
//!
//! Owns the live pieces and their physics bodies. Pure bookkeeping: it
//! spawns, removes and mirrors body state, but never decides game policy.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::warn;

use crate::config::ArenaConfig;
use crate::core::vec2::Vec2;
use crate::game::physics::{BodyHandle, BoundaryShape, PhysicsWorld};
use crate::game::rank::{Material, Rank, RankTable};
use crate::game::state::{PieceId, SessionId};
use crate::game::GameError;

/// A live piece in the arena.
#[derive(Clone, Debug)]
pub struct Piece {
    /// Unique id, assigned at spawn.
    pub id: PieceId,
    /// Size tier.
    pub rank: Rank,
    /// Collision radius (cached from the rank table).
    pub radius: f32,
    /// Center position.
    pub position: Vec2,
    /// Linear velocity (px/s).
    pub velocity: Vec2,
    /// Rotation (radians).
    pub rotation: f32,
    /// Angular velocity (rad/s).
    pub angular_velocity: f32,
    /// Session that dropped it (merged pieces inherit from their first source).
    pub owner: Option<SessionId>,
    /// When it entered the registry.
    pub spawned_at: Instant,
    /// Physics reports the body asleep.
    pub sleeping: bool,
    /// Body was missing at the last sync; skipped until it reappears.
    pub(crate) stale: bool,
    body: BodyHandle,
}

impl Piece {
    /// Top edge y (smaller is higher).
    #[inline]
    pub fn top(&self) -> f32 {
        self.position.y - self.radius
    }

    /// Linear speed (px/s).
    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    /// Body handle backing this piece.
    #[inline]
    pub fn body(&self) -> BodyHandle {
        self.body
    }

    /// Whether the last sync failed to find this piece's body.
    #[inline]
    pub fn is_stale(&self) -> bool {
        self.stale
    }
}

/// Kinematics for a piece created by the simulation rather than a drop.
#[derive(Clone, Copy, Debug)]
pub struct SpawnRequest {
    /// Rank of the new piece.
    pub rank: Rank,
    /// Center position.
    pub position: Vec2,
    /// Initial linear velocity.
    pub velocity: Vec2,
    /// Owning session.
    pub owner: Option<SessionId>,
}

/// Registry of live pieces and their bodies.
///
/// Iteration order is spawn order (ids are monotonic).
pub struct EntityRegistry<P: PhysicsWorld> {
    physics: P,
    pieces: BTreeMap<PieceId, Piece>,
    next_id: u64,
    ranks: RankTable,
    arena: ArenaConfig,
}

impl<P: PhysicsWorld> EntityRegistry<P> {
    /// Create a registry and build the arena walls and floor in `physics`.
    pub fn new(mut physics: P, arena: ArenaConfig) -> Self {
        let half_border = arena.border * 0.5;
        let half_height = arena.height * 0.5;

        // Left wall, right wall, floor. The top stays open.
        let walls = [
            (Vec2::new(half_border, half_height), Vec2::new(half_border, half_height)),
            (Vec2::new(arena.width - half_border, half_height), Vec2::new(half_border, half_height)),
            (Vec2::new(arena.width * 0.5, arena.height - half_border), Vec2::new(arena.width * 0.5, half_border)),
        ];
        for (center, half_extents) in walls {
            physics.create_boundary(BoundaryShape::Rect { center, half_extents }, Material::BOUNDARY);
        }

        Self {
            physics,
            pieces: BTreeMap::new(),
            next_id: 1,
            ranks: RankTable,
            arena,
        }
    }

    /// Clamp a requested drop x into the playable band for `rank`.
    ///
    /// Non-finite input lands in the middle of the arena.
    pub fn clamp_drop_x(&self, rank: Rank, x: f32) -> f32 {
        let radius = self.ranks.radius(rank);
        let min = radius + self.arena.border;
        let max = self.arena.width - radius - self.arena.border;
        let x = if x.is_finite() { x } else { self.arena.width * 0.5 };
        x.max(min).min(max)
    }

    /// Y coordinate for a freshly dropped piece of `rank`.
    pub fn spawn_y(&self, rank: Rank) -> f32 {
        self.arena.border + self.ranks.radius(rank) + self.arena.spawn_margin
    }

    /// Drop a new piece at the top of the arena, at rest.
    pub fn spawn(&mut self, rank: Rank, x: f32, owner: Option<SessionId>, now: Instant) -> PieceId {
        let position = Vec2::new(self.clamp_drop_x(rank, x), self.spawn_y(rank));
        self.spawn_at(
            SpawnRequest {
                rank,
                position,
                velocity: Vec2::ZERO,
                owner,
            },
            now,
        )
    }

    /// Create a piece with explicit kinematics.
    pub fn spawn_at(&mut self, request: SpawnRequest, now: Instant) -> PieceId {
        let definition = self.ranks.get(request.rank);
        let radius = definition.radius();

        let body = self
            .physics
            .create_circular_body(request.position, radius, definition.material());
        if request.velocity != Vec2::ZERO {
            self.physics.set_velocity(body, request.velocity);
        }

        let id = PieceId(self.next_id);
        self.next_id += 1;

        self.pieces.insert(id, Piece {
            id,
            rank: request.rank,
            radius,
            position: request.position,
            velocity: request.velocity,
            rotation: 0.0,
            angular_velocity: 0.0,
            owner: request.owner,
            spawned_at: now,
            sleeping: false,
            stale: false,
            body,
        });

        id
    }

    /// Remove a piece and destroy its body.
    pub fn remove(&mut self, id: PieceId) -> Option<Piece> {
        let piece = self.pieces.remove(&id)?;
        if !self.physics.destroy_body(piece.body) {
            warn!("Piece {} had no body {} at removal", id, piece.body);
        }
        Some(piece)
    }

    /// Remove every piece. Returns how many were removed.
    pub fn clear(&mut self) -> usize {
        let ids: Vec<PieceId> = self.pieces.keys().copied().collect();
        for id in &ids {
            self.remove(*id);
        }
        ids.len()
    }

    /// Advance the physics world by `dt` seconds.
    pub fn step(&mut self, dt: f32) {
        self.physics.step(dt);
    }

    /// Copy the latest body state into every piece.
    ///
    /// Pieces whose body is missing are flagged stale and returned.
    pub fn sync_from_physics(&mut self) -> Vec<PieceId> {
        let mut stale = Vec::new();

        for piece in self.pieces.values_mut() {
            match self.physics.body_state(piece.body) {
                Some(state) => {
                    piece.position = state.position;
                    piece.velocity = state.velocity;
                    piece.rotation = state.angle;
                    piece.angular_velocity = state.angular_velocity;
                    piece.sleeping = state.is_settled;
                    piece.stale = false;
                }
                None => {
                    if !piece.stale {
                        warn!("{} ({}), skipping", GameError::StaleReference(piece.id), piece.body);
                    }
                    piece.stale = true;
                    stale.push(piece.id);
                }
            }
        }

        stale
    }

    /// Look up a piece.
    pub fn get(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.get(&id)
    }

    /// Whether a piece is live.
    pub fn contains(&self, id: PieceId) -> bool {
        self.pieces.contains_key(&id)
    }

    /// Pieces in registry order.
    pub fn iter(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.values()
    }

    /// Number of live pieces.
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// True if no piece is live.
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// Rank table in use.
    pub fn ranks(&self) -> &RankTable {
        &self.ranks
    }

    /// Arena geometry.
    pub fn arena(&self) -> &ArenaConfig {
        &self.arena
    }

    /// Physics world.
    pub fn physics(&self) -> &P {
        &self.physics
    }

    /// Physics world, mutably.
    pub fn physics_mut(&mut self) -> &mut P {
        &mut self.physics
    }
}
