//! # Merge Drop Server
//!
//! Authoritative real-time server for a shared merge-on-drop arena: players
//! drop ranked circular pieces into one physics box, equal ranks that touch
//! fuse into the next rank, and the game ends when settled pieces pile above
//! the danger line for too long.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    MERGE DROP SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config.rs       - Server and game tunables, env overlay     │
//! │                                                              │
//! │  core/           - Primitives                                │
//! │  ├── vec2.rs     - 2D f32 vector                             │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG                  │
//! │  └── hash.rs     - Snapshot change signature                 │
//! │                                                              │
//! │  game/           - Arena rules                               │
//! │  ├── rank.rs     - Rank table                                │
//! │  ├── physics.rs  - Physics seam + rapier2d backend           │
//! │  ├── entity.rs   - Piece registry                            │
//! │  ├── merge.rs    - Merge resolver                            │
//! │  ├── scoring.rs  - Points and combo                          │
//! │  ├── game_over.rs- Danger-line monitor                       │
//! │  ├── state.rs    - Ids, counters, world                      │
//! │  └── tick.rs     - Simulation step                           │
//! │                                                              │
//! │  network/        - Transport                                 │
//! │  ├── server.rs   - WebSocket server + game loop              │
//! │  ├── session.rs  - Arena session (server context)            │
//! │  ├── players.rs  - Sessions, next-piece queue, recorder      │
//! │  ├── broadcast.rs- Snapshot scheduling                       │
//! │  ├── protocol.rs - Message types                             │
//! │  └── health.rs   - Health endpoint                           │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! One game-loop task owns all game state. Connection tasks send it
//! commands over a channel; the loop interleaves them with the simulation,
//! broadcast and combo-decay clocks, so no handler ever overlaps another
//! and no state is locked.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ServerConfig, GameConfig, ArenaConfig, ConfigError};
pub use core::vec2::Vec2;
pub use core::rng::SeededRng;
pub use game::{GameWorld, GameError, Rank, PhysicsWorld, ArenaPhysics};
pub use game::state::{PieceId, SessionId};
pub use network::{GameServer, GameServerError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;

/// Snapshot broadcast rate (Hz)
pub const BROADCAST_RATE: u32 = 30;
