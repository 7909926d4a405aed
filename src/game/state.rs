//! Game State Definitions
//!
//! Identifiers, the score/combo counters, and [`GameWorld`]: the bundle of
//! registry, dedup set, game-over monitor and counters that one arena owns.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use serde::{Serialize, Deserialize};
use tracing::info;

use crate::config::{ConfigError, GameConfig};
use crate::game::entity::EntityRegistry;
use crate::game::game_over::GameOverMonitor;
use crate::game::merge::MergeDedupSet;
use crate::game::physics::PhysicsWorld;
use crate::game::rank::RankTable;

/// Label used when a drop carries no player name.
pub const DEFAULT_CONTRIBUTOR: &str = "Anonymous";

/// Longest contributor name kept, in characters.
pub const MAX_CONTRIBUTOR_CHARS: usize = 24;

// =============================================================================
// IDS
// =============================================================================

/// Unique piece identifier, monotonic per process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PieceId(pub u64);

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connected player session identifier (UUID v4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    /// Fresh random id.
    pub fn new_v4() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First block is enough to tell sessions apart in logs
        let full = self.0.simple().to_string();
        write!(f, "{}", &full[..8])
    }
}

// =============================================================================
// GAME STATE
// =============================================================================

/// Score, combo and bookkeeping counters for one game.
#[derive(Clone, Debug, Default)]
pub struct GameState {
    /// Current score.
    pub score: u64,
    /// Best score seen since the process started.
    pub high_score: u64,
    /// Current combo length (0 = no active combo).
    pub combo: u32,
    /// Longest combo this game.
    pub max_combo: u32,
    /// Game has ended; only a restart clears it.
    pub game_over: bool,
    /// Pieces dropped by players this game.
    pub total_spawned: u64,
    /// Drops per contributor name; survives restarts.
    pub contributors: BTreeMap<String, u32>,
    /// Time of the most recent merge.
    pub last_merge_at: Option<Instant>,
}

impl GameState {
    /// Fresh state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new game, keeping the high score and contributor counts.
    pub fn reset_for_restart(&mut self) {
        *self = Self {
            high_score: self.high_score,
            contributors: std::mem::take(&mut self.contributors),
            ..Self::default()
        };
    }

    /// Count a drop towards `name` and return the label used.
    pub fn record_contribution(&mut self, name: Option<&str>) -> String {
        let label = normalize_contributor(name);
        *self.contributors.entry(label.clone()).or_insert(0) += 1;
        label
    }
}

/// Trim a contributor name and cap its length; blank names become the default.
pub fn normalize_contributor(name: Option<&str>) -> String {
    let trimmed = name.map(str::trim).unwrap_or_default();
    if trimmed.is_empty() {
        return DEFAULT_CONTRIBUTOR.to_string();
    }
    trimmed.chars().take(MAX_CONTRIBUTOR_CHARS).collect()
}

// =============================================================================
// GAME WORLD
// =============================================================================

/// Everything the simulation mutates for one arena.
pub struct GameWorld<P: PhysicsWorld> {
    /// Tunables.
    pub config: GameConfig,
    /// Live pieces and bodies.
    pub registry: EntityRegistry<P>,
    /// Pairs already merged this contact episode.
    pub dedup: MergeDedupSet,
    /// Debounced game-over state machine.
    pub monitor: GameOverMonitor,
    /// Score and counters.
    pub state: GameState,
    /// Simulation ticks run this game.
    pub tick: u64,
}

impl<P: PhysicsWorld> GameWorld<P> {
    /// Build a world around a physics backend.
    pub fn new(physics: P, config: GameConfig) -> Result<Self, ConfigError> {
        config.validate(RankTable.largest_radius())?;

        Ok(Self {
            registry: EntityRegistry::new(physics, config.arena.clone()),
            dedup: MergeDedupSet::new(),
            monitor: GameOverMonitor::new(config.game_over_grace),
            state: GameState::new(),
            tick: 0,
            config,
        })
    }

    /// Return to the initial configuration, keeping high score and contributors.
    ///
    /// Destroys every body before returning.
    pub fn restart(&mut self) {
        let removed = self.registry.clear();
        self.dedup.clear();
        self.monitor.reset();
        self.state.reset_for_restart();
        self.tick = 0;

        info!("Game restarted ({} pieces cleared, high score {})", removed, self.state.high_score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::physics::scripted::ScriptedPhysics;
    use crate::game::rank::Rank;

    #[test]
    fn test_contributor_normalization() {
        assert_eq!(normalize_contributor(None), "Anonymous");
        assert_eq!(normalize_contributor(Some("   ")), "Anonymous");
        assert_eq!(normalize_contributor(Some("  kiwi ")), "kiwi");

        let long = "x".repeat(100);
        assert_eq!(normalize_contributor(Some(&long)).chars().count(), MAX_CONTRIBUTOR_CHARS);
    }

    #[test]
    fn test_record_contribution_counts() {
        let mut state = GameState::new();
        state.record_contribution(Some("ann"));
        state.record_contribution(Some("ann"));
        state.record_contribution(None);

        assert_eq!(state.contributors["ann"], 2);
        assert_eq!(state.contributors[DEFAULT_CONTRIBUTOR], 1);
    }

    #[test]
    fn test_reset_keeps_high_score_and_contributors() {
        let mut state = GameState {
            score: 500,
            high_score: 800,
            combo: 3,
            max_combo: 4,
            game_over: true,
            total_spawned: 12,
            last_merge_at: Some(Instant::now()),
            ..Default::default()
        };
        state.record_contribution(Some("bo"));

        state.reset_for_restart();

        assert_eq!(state.score, 0);
        assert_eq!(state.high_score, 800);
        assert_eq!(state.combo, 0);
        assert_eq!(state.max_combo, 0);
        assert!(!state.game_over);
        assert_eq!(state.total_spawned, 0);
        assert!(state.last_merge_at.is_none());
        assert_eq!(state.contributors["bo"], 1);
    }

    #[test]
    fn test_world_restart_clears_board() {
        let mut world = GameWorld::new(ScriptedPhysics::new(), GameConfig::default()).unwrap();
        let now = Instant::now();
        world.registry.spawn(Rank::MIN, 100.0, None, now);
        world.registry.spawn(Rank::MIN, 200.0, None, now);
        world.state.score = 90;
        world.state.high_score = 90;
        world.state.game_over = true;
        world.tick = 42;

        world.restart();

        assert!(world.registry.is_empty());
        assert_eq!(world.registry.physics().body_count(), 0);
        assert_eq!(world.state.score, 0);
        assert_eq!(world.state.high_score, 90);
        assert!(!world.state.game_over);
        assert!(world.monitor.is_safe());
        assert_eq!(world.tick, 0);
    }

    #[test]
    fn test_session_id_display_is_short() {
        let id = SessionId::from_bytes([0xab; 16]);
        assert_eq!(id.to_string(), "abababab");
    }
}
