//! Rank Table
//!
//! Static lookup from piece rank to its visual and physical parameters.

use serde::{Serialize, Deserialize};

use crate::game::GameError;

/// Highest rank a piece can reach. Two pieces of this rank never merge.
pub const MAX_RANK: u8 = 11;

/// Number of low ranks the upcoming-piece queue draws from.
pub const DROPPABLE_RANKS: usize = 5;

/// Draw weights (percent) over the droppable ranks, lowest first.
pub const DROP_WEIGHTS: [u32; DROPPABLE_RANKS] = [35, 25, 20, 15, 5];

/// Piece rank in `1..=MAX_RANK`.
///
/// Construction is checked, so every `Rank` in the system is in range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rank(u8);

impl Rank {
    /// Smallest rank.
    pub const MIN: Rank = Rank(1);

    /// Largest rank.
    pub const MAX: Rank = Rank(MAX_RANK);

    /// Create a rank, returning `None` when out of range.
    pub const fn new(value: u8) -> Option<Rank> {
        if value >= 1 && value <= MAX_RANK {
            Some(Rank(value))
        } else {
            None
        }
    }

    /// Raw rank value.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Next rank, if not already the largest.
    pub fn next(self) -> Option<Rank> {
        Rank::new(self.0 + 1)
    }

    /// Whether two pieces of this rank can fuse.
    #[inline]
    pub fn can_merge(self) -> bool {
        self.0 < MAX_RANK
    }
}

impl TryFrom<u8> for Rank {
    type Error = GameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Rank::new(value).ok_or(GameError::UnknownRank(value))
    }
}

impl From<Rank> for u8 {
    fn from(rank: Rank) -> u8 {
        rank.0
    }
}

/// Physics material of a piece body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Material {
    /// Coulomb friction coefficient.
    pub friction: f32,
    /// Bounciness in `0..=1`.
    pub restitution: f32,
    /// Mass per unit area.
    pub density: f32,
}

impl Material {
    /// Material used for walls and floor.
    pub const BOUNDARY: Material = Material {
        friction: 0.3,
        restitution: 0.1,
        density: 0.0,
    };
}

/// Static description of one rank.
#[derive(Clone, Debug, PartialEq)]
pub struct RankDefinition {
    /// Rank this entry describes.
    pub rank: Rank,
    /// Name shown to players.
    pub display_name: &'static str,
    /// CSS color used for merge effects.
    pub color: &'static str,
    /// Sprite reference for clients.
    pub image: &'static str,
    /// Base of the radius formula.
    pub base_size: f32,
    /// Radius growth per rank.
    pub size_increment: f32,
    /// Scale applied to the visual size for collisions.
    pub collision_scale: f32,
}

impl RankDefinition {
    /// Collision radius: `(base + rank * increment) * scale`.
    #[inline]
    pub fn radius(&self) -> f32 {
        (self.base_size + self.rank.get() as f32 * self.size_increment) * self.collision_scale
    }

    /// Body material. Bigger pieces grip more and bounce less.
    pub fn material(&self) -> Material {
        let r = self.rank.get() as f32;
        Material {
            friction: 0.1 + r * 0.02,
            restitution: (0.25 - r * 0.015).max(0.05),
            density: 0.001 * (1.0 + r * 0.1),
        }
    }
}

/// Points for producing `rank`: `2^rank * 10`.
#[inline]
pub fn base_points(rank: Rank) -> u32 {
    (1u32 << rank.get()) * 10
}

const fn def(
    rank: u8,
    display_name: &'static str,
    color: &'static str,
    image: &'static str,
) -> RankDefinition {
    RankDefinition {
        rank: Rank(rank),
        display_name,
        color,
        image,
        base_size: 10.0,
        size_increment: 8.0,
        collision_scale: 1.0,
    }
}

static RANKS: [RankDefinition; MAX_RANK as usize] = [
    def(1, "Cherry", "#e2264d", "cherry.png"),
    def(2, "Strawberry", "#ff4f5e", "strawberry.png"),
    def(3, "Grape", "#8e44ad", "grape.png"),
    def(4, "Dekopon", "#ffa726", "dekopon.png"),
    def(5, "Persimmon", "#ff7043", "persimmon.png"),
    def(6, "Apple", "#e53935", "apple.png"),
    def(7, "Pear", "#d4e157", "pear.png"),
    def(8, "Peach", "#ffab91", "peach.png"),
    def(9, "Pineapple", "#fdd835", "pineapple.png"),
    def(10, "Melon", "#9ccc65", "melon.png"),
    def(11, "Watermelon", "#43a047", "watermelon.png"),
];

/// Read-only rank table.
#[derive(Clone, Copy, Debug, Default)]
pub struct RankTable;

impl RankTable {
    /// Look up a rank's definition.
    #[inline]
    pub fn get(&self, rank: Rank) -> &'static RankDefinition {
        &RANKS[(rank.get() - 1) as usize]
    }

    /// Collision radius of a rank.
    #[inline]
    pub fn radius(&self, rank: Rank) -> f32 {
        self.get(rank).radius()
    }

    /// Radius of the largest rank.
    pub fn largest_radius(&self) -> f32 {
        self.radius(Rank::MAX)
    }

    /// All definitions, lowest rank first.
    pub fn iter(&self) -> impl Iterator<Item = &'static RankDefinition> {
        RANKS.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank_bounds() {
        assert!(Rank::new(0).is_none());
        assert!(Rank::new(MAX_RANK + 1).is_none());
        assert_eq!(Rank::new(1), Some(Rank::MIN));
        assert_eq!(Rank::new(MAX_RANK), Some(Rank::MAX));
        assert_eq!(Rank::MAX.next(), None);
        assert_eq!(Rank::try_from(0), Err(GameError::UnknownRank(0)));
        assert!(!Rank::MAX.can_merge());
        assert!(Rank::MIN.can_merge());
    }

    #[test]
    fn test_table_is_indexed_by_rank() {
        let table = RankTable;
        for (i, def) in table.iter().enumerate() {
            assert_eq!(def.rank.get() as usize, i + 1);
        }
        assert_eq!(table.get(Rank::MAX).display_name, "Watermelon");
    }

    #[test]
    fn test_radius_formula() {
        let table = RankTable;
        assert_eq!(table.radius(Rank::MIN), 18.0);
        assert_eq!(table.largest_radius(), 98.0);

        let mut last = 0.0;
        for def in table.iter() {
            assert!(def.radius() > last);
            last = def.radius();
        }
    }

    #[test]
    fn test_base_points() {
        assert_eq!(base_points(Rank::new(2).unwrap()), 40);
        assert_eq!(base_points(Rank::new(3).unwrap()), 80);
        assert_eq!(base_points(Rank::MAX), 20480);
    }

    #[test]
    fn test_rank_serde() {
        let json = serde_json::to_string(&Rank::new(4).unwrap()).unwrap();
        assert_eq!(json, "4");
        assert!(serde_json::from_str::<Rank>("12").is_err());
        assert_eq!(serde_json::from_str::<Rank>("1").unwrap(), Rank::MIN);
    }
}
