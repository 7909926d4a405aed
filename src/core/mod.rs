//! Core primitives.
//!
//! Math, randomness and hashing shared by the game and network layers.

pub mod vec2;
pub mod rng;
pub mod hash;

// Re-export core types
pub use vec2::Vec2;
pub use rng::SeededRng;
pub use hash::{snapshot_signature, Signature};
