//! Level mask of a cell
//!
//! Bit `n - 1` of the mask is set when level `n` carries its own hash. Level 0
//! is always significant. Ordinary cells inherit the union of their children's
//! masks, pruned branches store the mask in their data and merkle cells shift
//! it down by one level.

use std::fmt;

/// Highest hash level a cell can have
pub const MAX_CELL_LEVEL: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LevelMask(u8);

impl LevelMask {
    pub const EMPTY: Self = Self(0);

    /// Creates a mask, ignoring bits above level 3
    pub const fn new(mask: u8) -> Self {
        Self(mask & 0b111)
    }

    /// Mask with only `level` set (empty for level 0)
    pub const fn with_level(level: u8) -> Self {
        if level == 0 {
            Self::EMPTY
        } else {
            Self::new(1 << (level - 1))
        }
    }

    pub const fn to_u8(self) -> u8 {
        self.0
    }

    /// Highest significant level
    pub const fn level(self) -> u8 {
        8 - self.0.leading_zeros() as u8
    }

    /// Number of significant levels strictly above level 0
    pub const fn hash_index(self) -> u8 {
        self.0.count_ones() as u8
    }

    /// Number of hashes a cell with this mask carries
    pub const fn hashes_count(self) -> u8 {
        self.hash_index() + 1
    }

    /// Keeps only the levels up to and including `level`
    pub const fn apply(self, level: u8) -> Self {
        if level >= MAX_CELL_LEVEL {
            self
        } else {
            Self(self.0 & ((1 << level) - 1))
        }
    }

    pub const fn is_significant(self, level: u8) -> bool {
        level == 0 || (level <= MAX_CELL_LEVEL && (self.0 >> (level - 1)) & 1 == 1)
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn shift_right(self) -> Self {
        Self(self.0 >> 1)
    }
}

impl From<u8> for LevelMask {
    fn from(mask: u8) -> Self {
        Self::new(mask)
    }
}

impl fmt::Display for LevelMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03b}", self.0)
    }
}
