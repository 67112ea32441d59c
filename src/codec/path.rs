//! Bit-packed decision paths.
//!
//! A path records one bit per tree level (0 = left, 1 = right) starting at
//! the least significant bit, followed by a terminal marker bit one level past
//! the leaf. The packed `u64` travels through the same `f64` channel as leaf
//! values by bit reinterpretation, never by numeric conversion.
//!
//! ```text
//! path "RLR"  ->  bits 0b1101
//!                       ^ marker at level 3
//! ```
//!
//! Paths deeper than 63 levels cannot carry a marker; levels past 64 are not
//! recorded at all.

use std::fmt;

/// Maximum number of levels a path can hold.
pub const MAX_PATH_DEPTH: usize = 64;

/// A decision path through one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DecisionPath(u64);

impl DecisionPath {
    /// Wrap raw path bits (branch bits plus marker).
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Set the terminal marker at `terminal_level` on top of `branch_bits`.
    ///
    /// Levels past the 64-bit capacity are dropped.
    #[inline]
    pub fn encode(branch_bits: u64, terminal_level: usize) -> Self {
        let marker = if terminal_level < MAX_PATH_DEPTH {
            1u64 << terminal_level
        } else {
            0
        };
        Self(branch_bits | marker)
    }

    /// Reinterpret as the `f64` carried through the scoring channel.
    #[inline]
    pub fn to_f64(self) -> f64 {
        f64::from_bits(self.0)
    }

    /// Recover a path from its `f64` carrier.
    #[inline]
    pub fn from_f64(value: f64) -> Self {
        Self(value.to_bits())
    }

    /// Depth of the leaf, i.e. the number of branch decisions recorded.
    ///
    /// An all-zero word carries no marker and decodes as the empty path.
    #[inline]
    pub fn depth(self) -> usize {
        if self.0 == 0 {
            0
        } else {
            (u64::BITS - 1 - self.0.leading_zeros()) as usize
        }
    }

    /// Whether the branch at `level` went right.
    #[inline]
    pub fn went_right(self, level: usize) -> bool {
        level < MAX_PATH_DEPTH && (self.0 >> level) & 1 == 1
    }

    /// Iterate branch decisions from the root: `false` = left, `true` = right.
    pub fn branches(self) -> impl Iterator<Item = bool> {
        (0..self.depth()).map(move |level| self.went_right(level))
    }
}

impl fmt::Display for DecisionPath {
    /// Formats the path as `L`/`R` characters from the root down.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for right in self.branches() {
            f.write_str(if right { "R" } else { "L" })?;
        }
        Ok(())
    }
}

/// Pack branch bits and a terminal level into the `f64` carrier.
#[inline]
pub fn encode_path(branch_bits: u64, terminal_level: usize) -> f64 {
    DecisionPath::encode(branch_bits, terminal_level).to_f64()
}

/// Decode an `f64` carrier into an `L`/`R` string.
pub fn decode_path(path: f64) -> String {
    DecisionPath::from_f64(path).to_string()
}
