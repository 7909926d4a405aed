//! Network Layer
//!
//! WebSocket transport, the arena session, and the health endpoint.
//! Game rules live in `game/`; this layer only routes and schedules.

pub mod protocol;
pub mod players;
pub mod broadcast;
pub mod session;
pub mod health;
pub mod server;

pub use protocol::{
    ClientMessage, ServerMessage, DropRequest, GameStateUpdate, BlockUpdate,
    MergeNotice, FinalScore, ErrorCode,
};
pub use players::{PlayerRegistry, PlayerSession};
pub use broadcast::BroadcastScheduler;
pub use session::{ArenaSession, GameCommand, HealthReport, SessionError};
pub use server::{GameServer, GameServerError, run_game_loop};
