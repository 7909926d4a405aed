//! Game Logic Module
//!
//! Everything that mutates the arena. Generic over the physics backend so
//! tests can drive it with a scripted world.
//!
//! ## Module Structure
//!
//! - `rank`: Rank table (radii, materials, points)
//! - `physics`: Physics seam and its rapier2d backend
//! - `entity`: Registry of live pieces and their bodies
//! - `merge`: Contact scan, dedup set, merge application
//! - `scoring`: Points and combo
//! - `game_over`: Danger-line monitor
//! - `state`: Ids, counters, and the per-arena world
//! - `tick`: Simulation step
//! - `events`: Tick events for the session layer

pub mod rank;
pub mod physics;
pub mod entity;
pub mod merge;
pub mod scoring;
pub mod game_over;
pub mod state;
pub mod tick;
pub mod events;

use crate::game::state::PieceId;

// Re-export key types
pub use rank::{Rank, RankTable, RankDefinition, Material, MAX_RANK, DROP_WEIGHTS};
pub use physics::{PhysicsWorld, ArenaPhysics, BodyHandle, BodyState};
pub use entity::{EntityRegistry, Piece};
pub use merge::{MergeDedupSet, MergeOutcome, PairKey};
pub use game_over::{GameOverMonitor, MonitorState};
pub use state::{GameState, GameWorld, SessionId};
pub use tick::{tick, TickResult};
pub use events::{GameEvent, GameEventData};

/// Game layer errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    /// Action rejected because the game has ended.
    #[error("Game is over")]
    GameOver,

    /// Piece whose physics body is gone.
    #[error("Piece {0} has no physics body")]
    StaleReference(PieceId),

    /// Rank outside the table.
    #[error("Unknown rank {0}")]
    UnknownRank(u8),
}
