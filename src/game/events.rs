//! Game Events
//!
//! Events produced by a simulation tick. The session layer turns them into
//! client notifications.

use serde::{Serialize, Deserialize};

use crate::core::vec2::Vec2;
use crate::game::merge::MergeOutcome;
use crate::game::rank::Rank;
use crate::game::state::PieceId;

/// Priority for event processing order.
///
/// Lower value = processed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Merges are announced before anything they may cause
    Merge = 0,
    /// Grace timer armed or cancelled
    GameOverTimer = 1,
    /// Game ended
    GameOver = 2,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Two pieces fused
    PieceMerged {
        /// Removed pieces, in scan order.
        sources: [PieceId; 2],
        /// Piece spawned in their place.
        merged: PieceId,
        /// Where the merged piece appeared.
        position: Vec2,
        /// Rank of the merged piece.
        new_rank: Rank,
        /// Points awarded.
        points: u32,
        /// Combo count after this merge.
        combo: u32,
    },

    /// A settled piece crossed the danger line
    GameOverArmed {
        /// Settled pieces over the line.
        violations: usize,
    },

    /// Every violation cleared before the deadline
    GameOverCancelled,

    /// Grace period ran out
    GameOver {
        /// Final score.
        score: u64,
        /// Best score this process.
        high_score: u64,
        /// Longest combo this game.
        max_combo: u32,
    },
}

/// A game event with timing and priority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,

    /// Processing priority
    pub priority: EventPriority,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event; priority follows from the data.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        let priority = match &data {
            GameEventData::PieceMerged { .. } => EventPriority::Merge,
            GameEventData::GameOverArmed { .. } | GameEventData::GameOverCancelled => {
                EventPriority::GameOverTimer
            }
            GameEventData::GameOver { .. } => EventPriority::GameOver,
        };

        Self { tick, priority, data }
    }

    /// Create merge event.
    pub fn piece_merged(tick: u64, outcome: &MergeOutcome) -> Self {
        Self::new(
            tick,
            GameEventData::PieceMerged {
                sources: [outcome.sources.low(), outcome.sources.high()],
                merged: outcome.merged,
                position: outcome.position,
                new_rank: outcome.new_rank,
                points: outcome.points,
                combo: outcome.combo,
            },
        )
    }

    /// Create game over event.
    pub fn game_over(tick: u64, score: u64, high_score: u64, max_combo: u32) -> Self {
        Self::new(
            tick,
            GameEventData::GameOver {
                score,
                high_score,
                max_combo,
            },
        )
    }
}

impl PartialEq for GameEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.priority == other.priority
    }
}

impl Eq for GameEvent {}

impl PartialOrd for GameEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GameEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.tick
            .cmp(&other.tick)
            .then(self.priority.cmp(&other.priority))
    }
}
