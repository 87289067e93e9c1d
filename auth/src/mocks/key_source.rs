//! Deterministic randomness for reproducible SRP handshakes.

use crate::srp::SrpKeySource;

/// Plays back a repeating byte pattern instead of real randomness.
#[derive(Debug, Clone, Copy)]
pub struct FixedKeySource {
    pattern: [u8; 8],
}

impl FixedKeySource {
    /// A source with a custom pattern.
    #[must_use]
    pub const fn with_pattern(pattern: [u8; 8]) -> Self {
        Self { pattern }
    }
}

impl Default for FixedKeySource {
    fn default() -> Self {
        Self {
            pattern: [0, 1, 2, 3, 4, 5, 6, 7],
        }
    }
}

impl SrpKeySource for FixedKeySource {
    fn ephemeral_private(&self) -> Vec<u8> {
        self.random_bytes(128)
    }

    fn random_bytes(&self, len: usize) -> Vec<u8> {
        (0..len).map(|i| self.pattern[i % 8]).collect()
    }
}
