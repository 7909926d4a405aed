//! Merge Resolver
//!
//! Pairwise contact scan over live pieces. Equal-rank pieces closer than
//! their combined radii (times a slack factor) fuse into the next rank.
//!
//! A piece takes part in at most one merge per tick, first match in
//! registry order wins. Sources are removed after the full scan, then the
//! merged pieces are spawned.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::debug;

use crate::config::GameConfig;
use crate::core::vec2::Vec2;
use crate::game::entity::{EntityRegistry, Piece, SpawnRequest};
use crate::game::physics::PhysicsWorld;
use crate::game::rank::Rank;
use crate::game::scoring;
use crate::game::state::{GameState, PieceId};

/// Unordered pair of piece ids, stored as (low, high).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey {
    low: PieceId,
    high: PieceId,
}

impl PairKey {
    /// Canonical key for `a` and `b` in either order.
    pub fn new(a: PieceId, b: PieceId) -> Self {
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    /// Smaller id.
    pub fn low(&self) -> PieceId {
        self.low
    }

    /// Larger id.
    pub fn high(&self) -> PieceId {
        self.high
    }

    /// Whether `id` is one of the pair.
    pub fn involves(&self, id: PieceId) -> bool {
        self.low == id || self.high == id
    }
}

/// Pairs already resolved in the current contact episode.
#[derive(Debug, Default, Clone)]
pub struct MergeDedupSet {
    pairs: BTreeSet<PairKey>,
}

impl MergeDedupSet {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pair. Returns false if it was already present.
    pub fn insert(&mut self, key: PairKey) -> bool {
        self.pairs.insert(key)
    }

    /// Whether a pair was already resolved.
    pub fn contains(&self, key: &PairKey) -> bool {
        self.pairs.contains(key)
    }

    /// Drop every pair that references a piece for which `is_live` is false.
    /// Returns the number of pairs dropped.
    pub fn prune(&mut self, is_live: impl Fn(PieceId) -> bool) -> usize {
        let before = self.pairs.len();
        self.pairs.retain(|key| is_live(key.low) && is_live(key.high));
        before - self.pairs.len()
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.pairs.clear();
    }

    /// Number of recorded pairs.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A merge found by the scan, not yet applied.
#[derive(Clone, Copy, Debug)]
pub struct PendingMerge {
    /// Dedup key of the two sources.
    pub key: PairKey,
    /// The piece that replaces them.
    pub spawn: SpawnRequest,
}

/// A merge that has been applied.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MergeOutcome {
    /// The two consumed pieces.
    pub sources: PairKey,
    /// The new piece.
    pub merged: PieceId,
    /// Where the new piece appeared.
    pub position: Vec2,
    /// Rank of the new piece.
    pub new_rank: Rank,
    /// Points awarded.
    pub points: u32,
    /// Combo count after this merge.
    pub combo: u32,
}

/// Whether two pieces are in mergeable contact.
///
/// Requires equal rank below the maximum and
/// `distance < (rA + rB) * proximity_factor`. Stale pieces never qualify.
pub fn in_merge_contact(a: &Piece, b: &Piece, proximity_factor: f32) -> bool {
    if a.id == b.id || a.rank != b.rank || !a.rank.can_merge() {
        return false;
    }
    if a.is_stale() || b.is_stale() {
        return false;
    }

    let reach = (a.radius + b.radius) * proximity_factor;
    a.position.distance_squared(b.position) < reach * reach
}

/// Scan `pieces` (registry order) for merges, recording each in `dedup`.
pub fn find_merges(
    pieces: &[&Piece],
    dedup: &mut MergeDedupSet,
    proximity_factor: f32,
    pop_speed: f32,
) -> Vec<PendingMerge> {
    let mut matched: BTreeSet<PieceId> = BTreeSet::new();
    let mut pending = Vec::new();

    for (i, a) in pieces.iter().enumerate() {
        if matched.contains(&a.id) {
            continue;
        }

        for b in &pieces[i + 1..] {
            if matched.contains(&b.id) || !in_merge_contact(a, b, proximity_factor) {
                continue;
            }

            let key = PairKey::new(a.id, b.id);
            if !dedup.insert(key) {
                continue;
            }

            let Some(new_rank) = a.rank.next() else {
                continue;
            };

            matched.insert(a.id);
            matched.insert(b.id);
            pending.push(PendingMerge {
                key,
                spawn: SpawnRequest {
                    rank: new_rank,
                    position: a.position.midpoint(b.position),
                    velocity: Vec2::new((a.velocity.x + b.velocity.x) * 0.5, -pop_speed),
                    owner: a.owner.or(b.owner),
                },
            });
            break;
        }
    }

    pending
}

/// Run one merge pass: scan, remove sources, spawn results, award points.
pub fn resolve_merges<P: PhysicsWorld>(
    registry: &mut EntityRegistry<P>,
    dedup: &mut MergeDedupSet,
    state: &mut GameState,
    config: &GameConfig,
    now: Instant,
) -> Vec<MergeOutcome> {
    let pending = {
        let pieces: Vec<&Piece> = registry.iter().collect();
        find_merges(&pieces, dedup, config.proximity_factor, config.merge_pop_speed)
    };

    if pending.is_empty() {
        return Vec::new();
    }

    for merge in &pending {
        registry.remove(merge.key.low());
        registry.remove(merge.key.high());
    }
    dedup.prune(|id| registry.contains(id));

    let mut outcomes = Vec::with_capacity(pending.len());
    for merge in pending {
        let merged = registry.spawn_at(merge.spawn, now);
        let points = scoring::resolve_merge(state, merge.spawn.rank, now, config.combo_window);

        debug!(
            "Merged {} + {} -> {} (rank {}, +{} pts, combo {})",
            merge.key.low(),
            merge.key.high(),
            merged,
            merge.spawn.rank.get(),
            points,
            state.combo
        );

        outcomes.push(MergeOutcome {
            sources: merge.key,
            merged,
            position: merge.spawn.position,
            new_rank: merge.spawn.rank,
            points,
            combo: state.combo,
        });
    }

    outcomes
}
