//! Protocol Messages
//!
//! Wire format for client-server communication over WebSocket.
//! Every message is a JSON object tagged by `type`, camelCase throughout.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};

use crate::game::rank::{Rank, RankDefinition};
use crate::game::state::PieceId;

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Drop the sender's queued piece.
    DropFruit(DropRequest),

    /// Start a new game.
    Restart,

    /// Ping for latency measurement.
    Ping {
        /// Client clock, echoed back.
        timestamp: u64,
    },
}

/// Drop request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropRequest {
    /// Requested x; clamped into the arena.
    pub x: f32,
    /// Name credited with the drop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full board snapshot.
    GameState(GameStateUpdate),

    /// Two pieces merged.
    Merge(MergeNotice),

    /// The receiving session's next piece.
    PersonalNextFruit(NextFruitNotice),

    /// Game ended.
    GameOver(FinalScore),

    /// Persist this result (history recorder only).
    SaveHistory(FinalScore),

    /// Request rejected.
    Error(ServerError),

    /// Ping response.
    Pong(PongInfo),

    /// Server is going away.
    Shutdown {
        /// Human-readable reason.
        reason: String,
    },
}

/// Board snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdate {
    /// Live pieces in registry order.
    pub blocks: Vec<BlockUpdate>,
    /// Current score.
    pub score: u64,
    /// Best score since the server started.
    pub high_score: u64,
    /// Game has ended.
    pub game_over: bool,
    /// Drops this game.
    pub total_spawned: u64,
    /// Longest combo this game.
    pub max_combo: u32,
    /// Current combo.
    pub combo: u32,
    /// Drops per contributor name.
    pub contributors: BTreeMap<String, u32>,
    /// Epoch milliseconds when the snapshot was built.
    pub server_time: i64,
}

/// One piece in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUpdate {
    /// Piece id.
    pub id: PieceId,
    /// Center x.
    pub x: f32,
    /// Center y.
    pub y: f32,
    /// Velocity x.
    pub vx: f32,
    /// Velocity y.
    pub vy: f32,
    /// Collision radius.
    pub radius: f32,
    /// Rotation (radians).
    pub rotation: f32,
    /// Angular velocity (rad/s).
    pub angular_velocity: f32,
    /// Rank.
    pub rank: Rank,
    /// Sprite reference.
    pub display_hint: String,
}

/// Merge notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeNotice {
    /// Merge point x.
    pub x: f32,
    /// Merge point y.
    pub y: f32,
    /// Color of the produced rank.
    pub color_hint: String,
    /// Points awarded.
    pub points: u32,
    /// Combo after the merge.
    pub combo: u32,
    /// Produced rank.
    pub new_rank: Rank,
}

/// Description of a queued piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FruitInfo {
    /// Rank.
    pub rank: Rank,
    /// Display name.
    pub name: String,
    /// Collision radius.
    pub radius: f32,
    /// Color.
    pub color: String,
    /// Sprite reference.
    pub image: String,
}

impl From<&RankDefinition> for FruitInfo {
    fn from(def: &RankDefinition) -> Self {
        Self {
            rank: def.rank,
            name: def.display_name.to_string(),
            radius: def.radius(),
            color: def.color.to_string(),
            image: def.image.to_string(),
        }
    }
}

/// Personal next-piece notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextFruitNotice {
    /// The piece the session will drop next.
    pub next_fruit: FruitInfo,
}

/// Final result of a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScore {
    /// Score when the game ended.
    pub score: u64,
    /// High score at that time.
    pub high_score: u64,
    /// Longest combo of the game.
    pub max_combo: u32,
}

/// Ping response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PongInfo {
    /// Echo of the client's timestamp.
    pub timestamp: u64,
    /// Epoch milliseconds on the server.
    pub server_time: i64,
}

/// Server error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Create an error message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Drop attempted after game over.
    GameOver,
    /// Message could not be parsed.
    InvalidMessage,
    /// Session is unknown to the server.
    NotConnected,
    /// Server overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Deserialize from raw bytes (binary frames carrying JSON).
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}
