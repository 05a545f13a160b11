//! Validated primitive types for the observer domain.
//!
//! These newtypes provide:
//! - Type safety (a block height is not a transaction number)
//! - Domain semantics in function signatures

use std::fmt;

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK HEIGHT
// ═══════════════════════════════════════════════════════════════════════════════

/// A ledger block height.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct BlockHeight(u64);

impl BlockHeight {
    /// Genesis height.
    pub const ZERO: Self = Self(0);

    /// Create a new block height.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// The next block height.
    #[must_use]
    pub const fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// The previous block height (saturating at genesis).
    #[must_use]
    pub const fn prev(&self) -> Self {
        Self(self.0.saturating_sub(1))
    }

    /// Height `blocks` after this one (saturating).
    #[must_use]
    pub const fn advance(&self, blocks: u64) -> Self {
        Self(self.0.saturating_add(blocks))
    }
}

impl fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for BlockHeight {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<BlockHeight> for u64 {
    fn from(height: BlockHeight) -> Self {
        height.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSACTION NUMBER
// ═══════════════════════════════════════════════════════════════════════════════

/// Monotonically increasing identifier issued by the anchor contract.
///
/// This is the primary ordering key for anchor records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TransactionNumber(u64);

impl TransactionNumber {
    /// Create a new transaction number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the underlying value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TransactionNumber {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<TransactionNumber> for u64 {
    fn from(number: TransactionNumber) -> Self {
        number.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
