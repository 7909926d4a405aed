//! Authoritative Simulation Tick
//!
//! One fixed step of the arena, always in this order:
//! physics step, sync, merges, game-over check. Nothing runs once the game
//! is over.

use std::time::Instant;

use tracing::info;
#[cfg(feature = "debug-tracing")]
use tracing::trace;

use crate::game::events::{GameEvent, GameEventData};
use crate::game::game_over::{count_violations, MonitorTransition};
use crate::game::merge::resolve_merges;
use crate::game::physics::PhysicsWorld;
use crate::game::scoring;
use crate::game::state::{GameWorld, PieceId};

/// Result of a tick.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated this tick
    pub events: Vec<GameEvent>,
    /// Whether the game ended this tick
    pub game_over: bool,
    /// Pieces whose body could not be read
    pub stale: Vec<PieceId>,
}

impl TickResult {
    /// Number of merges this tick.
    pub fn merge_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e.data, GameEventData::PieceMerged { .. }))
            .count()
    }
}

/// Run one simulation tick.
pub fn tick<P: PhysicsWorld>(world: &mut GameWorld<P>, now: Instant) -> TickResult {
    let mut result = TickResult::default();

    if world.state.game_over {
        return result;
    }

    // 0. Advance tick counter
    world.tick += 1;
    let tick = world.tick;

    // 1. Physics
    world.registry.step(world.config.tick_seconds());

    // 2. Mirror body state, must finish before anything reads positions
    result.stale = world.registry.sync_from_physics();

    // 3. Merges
    let merges = resolve_merges(
        &mut world.registry,
        &mut world.dedup,
        &mut world.state,
        &world.config,
        now,
    );
    for outcome in &merges {
        result.events.push(GameEvent::piece_merged(tick, outcome));
    }

    // 4. Game-over monitor sees the post-merge board
    let violations = count_violations(&world.registry, &world.config, now);
    match world.monitor.observe(violations, now) {
        MonitorTransition::None => {}
        MonitorTransition::Armed(_) => {
            result
                .events
                .push(GameEvent::new(tick, GameEventData::GameOverArmed { violations }));
        }
        MonitorTransition::Cancelled(_) => {
            result.events.push(GameEvent::new(tick, GameEventData::GameOverCancelled));
        }
        MonitorTransition::Fired(_) => {
            world.state.game_over = true;
            result.game_over = true;
            result.events.push(GameEvent::game_over(
                tick,
                world.state.score,
                world.state.high_score,
                world.state.max_combo,
            ));
            info!(
                "Game over at tick {} (score {}, high score {}, max combo {})",
                tick, world.state.score, world.state.high_score, world.state.max_combo
            );
        }
    }

    #[cfg(feature = "debug-tracing")]
    trace!(
        "tick {} pieces={} merges={} violations={} score={}",
        tick,
        world.registry.len(),
        merges.len(),
        violations,
        world.state.score
    );

    result.events.sort();
    result
}

/// Combo decay check, run on its own interval.
pub fn decay_combo<P: PhysicsWorld>(world: &mut GameWorld<P>, now: Instant) -> bool {
    scoring::decay_combo(&mut world.state, now, world.config.combo_window)
}
