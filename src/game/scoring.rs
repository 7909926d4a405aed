//! Scoring & Combo
//!
//! Merges chained within the combo window build a combo; each combo step
//! adds ten percent to the base points of the produced rank.

use std::time::{Duration, Instant};

use crate::game::rank::{base_points, Rank};
use crate::game::state::GameState;

/// Points for producing `new_rank` at combo length `combo`.
///
/// `floor(base * (1 + combo / 10))`, computed in integers.
pub fn combo_points(new_rank: Rank, combo: u32) -> u32 {
    let base = base_points(new_rank) as u64;
    let scaled = base * (10 + combo as u64) / 10;
    scaled.min(u32::MAX as u64) as u32
}

/// Record a merge producing `new_rank` at `now` and return the points awarded.
pub fn resolve_merge(state: &mut GameState, new_rank: Rank, now: Instant, window: Duration) -> u32 {
    let chained = state.combo > 0
        && state
            .last_merge_at
            .is_some_and(|last| now.saturating_duration_since(last) < window);

    let points = if chained {
        state.combo += 1;
        combo_points(new_rank, state.combo)
    } else {
        state.combo = 1;
        base_points(new_rank)
    };

    state.score += points as u64;
    state.high_score = state.high_score.max(state.score);
    state.max_combo = state.max_combo.max(state.combo);
    state.last_merge_at = Some(now);

    points
}

/// Reset the combo once the window has passed without a merge.
///
/// Returns true if the combo was reset.
pub fn decay_combo(state: &mut GameState, now: Instant, window: Duration) -> bool {
    if state.combo == 0 {
        return false;
    }

    let expired = match state.last_merge_at {
        Some(last) => now.saturating_duration_since(last) > window,
        None => true,
    };
    if expired {
        state.combo = 0;
    }
    expired
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const WINDOW: Duration = Duration::from_millis(2000);

    fn rank(value: u8) -> Rank {
        Rank::new(value).unwrap()
    }

    #[test]
    fn test_first_merge_is_base_points() {
        let mut state = GameState::new();
        let points = resolve_merge(&mut state, rank(2), Instant::now(), WINDOW);

        assert_eq!(points, 40);
        assert_eq!(state.score, 40);
        assert_eq!(state.combo, 1);
        assert_eq!(state.max_combo, 1);
        assert_eq!(state.high_score, 40);
    }

    #[test]
    fn test_chained_merge_gets_bonus() {
        let mut state = GameState::new();
        let t0 = Instant::now();
        resolve_merge(&mut state, rank(2), t0, WINDOW);
        let points = resolve_merge(&mut state, rank(2), t0 + Duration::from_millis(500), WINDOW);

        // floor(40 * 1.2)
        assert_eq!(points, 48);
        assert_eq!(state.combo, 2);
        assert_eq!(state.score, 88);
    }

    #[test]
    fn test_merge_after_window_restarts_combo() {
        let mut state = GameState::new();
        let t0 = Instant::now();
        resolve_merge(&mut state, rank(3), t0, WINDOW);
        resolve_merge(&mut state, rank(3), t0 + Duration::from_millis(100), WINDOW);
        let points = resolve_merge(&mut state, rank(3), t0 + Duration::from_millis(2500), WINDOW);

        assert_eq!(points, 80);
        assert_eq!(state.combo, 1);
        assert_eq!(state.max_combo, 2);
    }

    #[test]
    fn test_decay_resets_after_window() {
        let mut state = GameState::new();
        let t0 = Instant::now();
        resolve_merge(&mut state, rank(2), t0, WINDOW);

        assert!(!decay_combo(&mut state, t0 + Duration::from_millis(1500), WINDOW));
        assert_eq!(state.combo, 1);

        assert!(decay_combo(&mut state, t0 + Duration::from_millis(2100), WINDOW));
        assert_eq!(state.combo, 0);
        assert_eq!(state.max_combo, 1);

        assert!(!decay_combo(&mut state, t0 + Duration::from_millis(5000), WINDOW));
    }

    #[test]
    fn test_high_score_is_running_max() {
        let mut state = GameState::new();
        state.high_score = 1000;
        resolve_merge(&mut state, rank(2), Instant::now(), WINDOW);
        assert_eq!(state.high_score, 1000);
        assert_eq!(state.score, 40);
    }

    proptest! {
        #[test]
        fn prop_combo_points_match_float_floor(r in 1u8..=11, combo in 0u32..50) {
            let base = base_points(rank(r)) as f64;
            let expected = (base * (1.0 + combo as f64 * 0.1) + 1e-9).floor() as u32;
            prop_assert_eq!(combo_points(rank(r), combo), expected);
        }

        #[test]
        fn prop_score_never_decreases(gaps in proptest::collection::vec(0u64..4000, 1..20)) {
            let mut state = GameState::new();
            let mut now = Instant::now();
            let mut last = 0;
            for gap in gaps {
                now += Duration::from_millis(gap);
                decay_combo(&mut state, now, WINDOW);
                resolve_merge(&mut state, rank(2), now, WINDOW);
                prop_assert!(state.score > last);
                prop_assert!(state.high_score >= state.score);
                last = state.score;
            }
        }
    }
}
