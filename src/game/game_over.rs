//! Game-Over Monitor
//!
//! Debounces the end of a game. A settled piece poking above the danger
//! line arms a grace timer; the game only ends if every tick until the
//! deadline still sees a violation.
//!
//! ```text
//!   Safe ──violation──▶ Pending ──deadline──▶ Over
//!     ▲                   │
//!     └────no violation───┘
//! ```

use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::GameConfig;
use crate::game::entity::{EntityRegistry, Piece};
use crate::game::physics::PhysicsWorld;

/// Identifies one arming of the grace timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimerToken(u64);

/// A pending grace timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameOverTimer {
    /// When the first violation was seen.
    pub armed_at: Instant,
    /// When the game ends unless cancelled.
    pub deadline: Instant,
    /// Token that must match for the timer to fire.
    pub token: TimerToken,
}

/// Monitor state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorState {
    /// No violation pending.
    Safe,
    /// Grace timer running.
    Pending(GameOverTimer),
    /// Game over, terminal until reset.
    Over,
}

/// What a single observation changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonitorTransition {
    /// Nothing changed.
    None,
    /// Safe -> Pending.
    Armed(GameOverTimer),
    /// Pending -> Safe.
    Cancelled(TimerToken),
    /// Pending -> Over.
    Fired(TimerToken),
}

/// Safe/Pending/Over state machine.
#[derive(Debug)]
pub struct GameOverMonitor {
    state: MonitorState,
    grace: Duration,
    next_token: u64,
}

impl GameOverMonitor {
    /// New monitor in the safe state.
    pub fn new(grace: Duration) -> Self {
        Self {
            state: MonitorState::Safe,
            grace,
            next_token: 0,
        }
    }

    /// Feed one tick's violation count.
    pub fn observe(&mut self, violations: usize, now: Instant) -> MonitorTransition {
        match self.state {
            MonitorState::Over => MonitorTransition::None,
            MonitorState::Safe if violations == 0 => MonitorTransition::None,
            MonitorState::Safe => {
                self.next_token += 1;
                let timer = GameOverTimer {
                    armed_at: now,
                    deadline: now + self.grace,
                    token: TimerToken(self.next_token),
                };
                self.state = MonitorState::Pending(timer);
                debug!("Game-over timer armed ({} violations)", violations);
                MonitorTransition::Armed(timer)
            }
            MonitorState::Pending(timer) if violations == 0 => {
                self.state = MonitorState::Safe;
                debug!(
                    "Game-over timer cancelled after {:?}",
                    now.saturating_duration_since(timer.armed_at)
                );
                MonitorTransition::Cancelled(timer.token)
            }
            MonitorState::Pending(timer) if now >= timer.deadline => {
                if self.fire(timer.token) {
                    MonitorTransition::Fired(timer.token)
                } else {
                    MonitorTransition::None
                }
            }
            MonitorState::Pending(_) => MonitorTransition::None,
        }
    }

    /// Fire the timer identified by `token`.
    ///
    /// A token from a cancelled or replaced timer is ignored.
    pub fn fire(&mut self, token: TimerToken) -> bool {
        match self.state {
            MonitorState::Pending(timer) if timer.token == token => {
                self.state = MonitorState::Over;
                true
            }
            _ => false,
        }
    }

    /// Back to safe, dropping any pending timer.
    pub fn reset(&mut self) {
        self.state = MonitorState::Safe;
    }

    /// Current state.
    pub fn state(&self) -> MonitorState {
        self.state
    }

    /// No timer pending and not over.
    pub fn is_safe(&self) -> bool {
        self.state == MonitorState::Safe
    }

    /// Grace timer running.
    pub fn is_pending(&self) -> bool {
        matches!(self.state, MonitorState::Pending(_))
    }

    /// Game has ended.
    pub fn is_over(&self) -> bool {
        self.state == MonitorState::Over
    }
}

/// Whether a piece counts as settled.
///
/// Slow enough OR reported asleep by physics.
pub fn is_settled(piece: &Piece, settle_speed: f32) -> bool {
    piece.sleeping || piece.speed() < settle_speed
}

/// Whether a piece is a settled violation of the danger line.
pub fn is_violation(piece: &Piece, config: &GameConfig, now: Instant) -> bool {
    if piece.is_stale() {
        return false;
    }
    if now.saturating_duration_since(piece.spawned_at) < config.spawn_grace {
        return false;
    }
    piece.top() < config.arena.danger_line_y && is_settled(piece, config.settle_speed)
}

/// Count settled violations across the registry.
pub fn count_violations<P: PhysicsWorld>(
    registry: &EntityRegistry<P>,
    config: &GameConfig,
    now: Instant,
) -> usize {
    registry
        .iter()
        .filter(|piece| is_violation(piece, config, now))
        .count()
}
