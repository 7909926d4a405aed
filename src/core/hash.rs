//! Change-Signal Hashing
//!
//! SHA-256 based fingerprinting used by the broadcast scheduler to tell
//! whether the coarse shape of the board changed since the last snapshot.

use sha2::{Sha256, Digest};

/// Truncated digest used as a change signature.
pub type Signature = u64;

/// Incremental hasher with a domain separator.
///
/// Order of updates matters.
pub struct SignatureHasher {
    hasher: Sha256,
}

impl SignatureHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for board snapshots.
    pub fn for_snapshot() -> Self {
        Self::new(b"MERGE_DROP_SNAPSHOT_V1")
    }

    /// Update with a u64 value (little-endian).
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.hasher.update([value as u8]);
    }

    /// Finalize, keeping the first eight bytes of the digest.
    pub fn finalize(self) -> Signature {
        let digest = self.hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[0..8]);
        u64::from_le_bytes(head)
    }
}

/// Coarse board signature: piece count, score and the game-over flag.
pub fn snapshot_signature(piece_count: usize, score: u64, game_over: bool) -> Signature {
    let mut hasher = SignatureHasher::for_snapshot();
    hasher.update_u64(piece_count as u64);
    hasher.update_u64(score);
    hasher.update_bool(game_over);
    hasher.finalize()
}
